//! The external control-plane API consumed by this crate.
//!
//! Implementations return [`RemoteFailure`] rather than domain errors; the
//! retry executor decides how each failure is classified.

use crate::credentials::Credential;
use crate::environment::EnvironmentMap;
use crate::labels::LabelSet;
use crate::model::{
    App, AppType, PersistentDisk, PersistentDiskRequest, Runtime, RuntimeConfig,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw failure of a single remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// The control plane answered with a non-success status.
    Status { code: u16, message: String },
    /// The request or connection timed out.
    Timeout(String),
    /// The connection could not be established.
    Connect(String),
    /// Anything else (decode errors, broken pipes, ...).
    Other(String),
}

impl RemoteFailure {
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        RemoteFailure::Status {
            code,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteFailure::Status { message, .. }
            | RemoteFailure::Timeout(message)
            | RemoteFailure::Connect(message)
            | RemoteFailure::Other(message) => message,
        }
    }
}

impl fmt::Display for RemoteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteFailure::Status { code, message } => write!(f, "HTTP {code}: {message}"),
            RemoteFailure::Timeout(m) => write!(f, "timeout: {m}"),
            RemoteFailure::Connect(m) => write!(f, "connection failed: {m}"),
            RemoteFailure::Other(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for RemoteFailure {}

pub type RemoteResult<T> = std::result::Result<T, RemoteFailure>;

/// Server-side filtering for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Comma-separated `key=value` label predicates.
    pub labels: Option<String>,
    pub include_deleted: bool,
    /// Label keys the control plane should echo back.
    pub include_labels: Option<String>,
    /// Restrict to resources where the caller holds this role.
    pub role: Option<String>,
}

impl ListFilter {
    pub fn labels(labels: impl Into<String>) -> Self {
        Self {
            labels: Some(labels.into()),
            ..Default::default()
        }
    }

    pub fn include_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }

    pub fn include_labels(mut self, keys: impl Into<String>) -> Self {
        self.include_labels = Some(keys.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuntimeRequest {
    pub labels: LabelSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_client_id: Option<String>,
    pub jupyter_user_script_uri: String,
    pub jupyter_start_user_script_uri: String,
    pub user_jupyter_extensions: LabelSet,
    pub scopes: Vec<String>,
    pub tool_docker_image: String,
    pub custom_environment_variables: EnvironmentMap,
    /// Only sent when an autopause threshold should be honoured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autopause: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autopause_threshold: Option<u32>,
    pub runtime_config: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuntimeRequest {
    pub allow_stop: bool,
    pub runtime_config: RuntimeConfig,
    pub autopause: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autopause_threshold: Option<u32>,
    pub labels_to_upsert: LabelSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesRuntimeConfig {
    pub num_nodes: u32,
    pub machine_type: String,
    pub autoscaling_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppRequest {
    pub app_type: AppType,
    pub kubernetes_runtime_config: KubernetesRuntimeConfig,
    pub disk_config: PersistentDiskRequest,
    pub custom_environment_variables: EnvironmentMap,
    pub workspace_id: String,
    pub labels: LabelSet,
    pub autodelete_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autodelete_threshold: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDiskRequest {
    pub size: u32,
}

/// Control-plane operations. Every call carries the credential it runs as.
#[async_trait]
pub trait ControlPlaneApi: Send + Sync {
    async fn create_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &CreateRuntimeRequest,
    ) -> RemoteResult<()>;

    async fn get_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<Runtime>;

    async fn update_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &UpdateRuntimeRequest,
    ) -> RemoteResult<()>;

    async fn delete_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        delete_disk: bool,
    ) -> RemoteResult<()>;

    async fn stop_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<()>;

    /// Runtimes across every project visible to the credential.
    async fn list_runtimes(
        &self,
        credential: &Credential,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>>;

    async fn list_runtimes_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>>;

    async fn create_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        request: &CreateAppRequest,
    ) -> RemoteResult<()>;

    async fn get_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
    ) -> RemoteResult<App>;

    async fn delete_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        delete_disk: bool,
    ) -> RemoteResult<()>;

    async fn list_apps(&self, credential: &Credential, filter: &ListFilter)
        -> RemoteResult<Vec<App>>;

    async fn list_apps_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<App>>;

    async fn get_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<PersistentDisk>;

    async fn update_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
        request: &UpdateDiskRequest,
    ) -> RemoteResult<()>;

    async fn delete_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<()>;

    async fn list_disks_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<PersistentDisk>>;

    /// Liveness of the control plane and its dependencies.
    async fn system_status(&self, credential: &Credential) -> RemoteResult<()>;
}
