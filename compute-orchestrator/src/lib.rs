//! Lifecycle orchestration for per-user compute environments (runtimes, apps
//! and their persistent disks) managed through an external control plane.

pub mod bulk;
pub mod client;
pub mod config;
pub mod control_plane;
pub mod credentials;
pub mod disks;
pub mod environment;
pub mod error;
pub mod http;
pub mod labels;
pub mod model;
pub mod retry;
pub mod status;
pub mod sweep;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bulk::{BulkStopOutcome, TargetOutcome};
pub use client::{ComputeClient, CreateAppSpec, RuntimeSpec};
pub use config::{ComputeConfig, RuntimeDefaults};
pub use control_plane::{ControlPlaneApi, ListFilter, RemoteFailure};
pub use credentials::{Credential, CredentialProvider, EnvCredentials};
pub use disks::{DiskReconciler, DiskReconciliation};
pub use environment::WorkspaceContext;
pub use error::{OrchestratorError, Result};
pub use http::HttpControlPlane;
pub use model::{
    App, AppType, PersistentDisk, ResourceId, Runtime, RuntimeConfig, RuntimeConfigurationType,
};
pub use retry::{CallKind, RetryExecutor, RetryPolicy};
pub use status::{AppStatus, DiskStatus, LifecycleStatus, RuntimeStatus};
pub use sweep::{EnvironmentSweeper, SweepTarget, WorkspaceAcl};
