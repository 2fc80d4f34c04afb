//! Fixtures shared by the compute-orchestrator integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use compute_orchestrator::environment::{BillingMigrationStatus, CdrContext};
use compute_orchestrator::labels::{self, LabelSet};
use compute_orchestrator::model::{AuditInfo, DiskType};
use compute_orchestrator::testing::{FakeControlPlane, StaticCredentials};
use compute_orchestrator::{
    App, AppStatus, AppType, ComputeClient, DiskStatus, PersistentDisk, RetryExecutor,
    RetryPolicy, Runtime, RuntimeDefaults, RuntimeStatus, WorkspaceContext,
};
use std::sync::Arc;

pub const PROJECT: &str = "wb-proj-1";
pub const ALICE: &str = "alice@example.org";
pub const BOB: &str = "bob@example.org";

pub struct Harness {
    pub api: Arc<FakeControlPlane>,
    pub credentials: Arc<StaticCredentials>,
    pub client: ComputeClient,
}

pub fn harness() -> Harness {
    harness_with(StaticCredentials::new(ALICE))
}

pub fn harness_with(credentials: StaticCredentials) -> Harness {
    harness_from(FakeControlPlane::new(), credentials)
}

pub fn harness_from(api: FakeControlPlane, credentials: StaticCredentials) -> Harness {
    let api = Arc::new(api);
    let credentials = Arc::new(credentials);
    let client = ComputeClient::new(
        api.clone(),
        credentials.clone(),
        RetryExecutor::new(RetryPolicy::immediate(3)),
        runtime_defaults(),
    );
    Harness {
        api,
        credentials,
        client,
    }
}

pub fn runtime_defaults() -> RuntimeDefaults {
    RuntimeDefaults {
        tool_docker_image: "us.gcr.io/example/jupyter:1.0".to_string(),
        assets_base_url: "https://assets.example.org/static".to_string(),
        default_client_id: Some("client-id".to_string()),
    }
}

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

fn owned_labels(creator: &str) -> LabelSet {
    labels::build_labels(creator, None, None)
}

pub fn runtime(name: &str, creator: &str, status: RuntimeStatus) -> Runtime {
    Runtime {
        google_project: PROJECT.to_string(),
        runtime_name: name.to_string(),
        status,
        audit_info: AuditInfo::new(creator, at(1)),
        labels: owned_labels(creator),
        disk_name: None,
        runtime_config: None,
        autopause_threshold: None,
    }
}

pub fn app(name: &str, creator: &str, app_type: AppType, status: AppStatus) -> App {
    App {
        google_project: PROJECT.to_string(),
        app_name: name.to_string(),
        app_type: Some(app_type),
        status,
        audit_info: AuditInfo::new(creator, at(1)),
        labels: labels::build_labels(creator, Some(app_type), None),
        disk_name: None,
    }
}

pub fn disk(
    name: &str,
    creator: &str,
    status: DiskStatus,
    app_type: Option<AppType>,
    day: u32,
) -> PersistentDisk {
    PersistentDisk {
        google_project: PROJECT.to_string(),
        name: name.to_string(),
        size_gb: 100,
        disk_type: DiskType::Standard,
        status,
        audit_info: AuditInfo::new(creator, at(day)),
        labels: labels::build_labels(creator, app_type, None),
    }
}

pub fn workspace() -> WorkspaceContext {
    WorkspaceContext {
        namespace: "aou-rw-test-1".to_string(),
        name: "Heart Study".to_string(),
        firecloud_name: "heartstudy".to_string(),
        firecloud_uuid: "3f1c5c2e-0000-4000-8000-000000000001".to_string(),
        google_project: PROJECT.to_string(),
        bucket_name: "fc-bucket-1".to_string(),
        caller_is_owner: true,
        terra_v2: false,
        billing_migration: BillingMigrationStatus::New,
        cdr: CdrContext {
            bigquery_project: "cdr-proj".to_string(),
            bigquery_dataset: "R2024Q1".to_string(),
            datasets_bucket: "gs://datasets".to_string(),
            all_samples_wgs_path: None,
            single_sample_array_path: None,
        },
    }
}
