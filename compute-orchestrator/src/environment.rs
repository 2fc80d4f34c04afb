//! Custom environment variables injected into runtimes and apps.
//!
//! The workspace metadata is looked up by the caller; this module only turns
//! it into the variable map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type EnvironmentMap = BTreeMap<String, String>;

pub const WORKSPACE_NAMESPACE_KEY: &str = "WORKSPACE_NAMESPACE";
pub const WORKSPACE_NAME_KEY: &str = "WORKSPACE_NAME";
pub const WORKSPACE_BUCKET_KEY: &str = "WORKSPACE_BUCKET";
pub const WORKSPACE_CDR_KEY: &str = "WORKSPACE_CDR";
pub const GOOGLE_PROJECT_KEY: &str = "GOOGLE_PROJECT";
pub const OWNER_EMAIL_KEY: &str = "OWNER_EMAIL";
pub const BIGQUERY_STORAGE_API_ENABLED_KEY: &str = "BIGQUERY_STORAGE_API_ENABLED";
pub const ALL_SAMPLES_WGS_KEY: &str = "ALL_SAMPLES_WGS_BUCKET";
pub const SINGLE_SAMPLE_ARRAY_BUCKET_KEY: &str = "SINGLE_SAMPLE_ARRAY_BUCKET";
pub const JUPYTER_DEBUG_LOGGING_KEY: &str = "JUPYTER_DEBUG_LOGGING";
pub const PYSPARK_PYTHON_KEY: &str = "PYSPARK_PYTHON";

const PYSPARK_PYTHON: &str = "/usr/local/bin/python3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingMigrationStatus {
    Old,
    #[default]
    New,
    Migrated,
}

/// Curated dataset release the workspace reads from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CdrContext {
    pub bigquery_project: String,
    pub bigquery_dataset: String,
    /// Tier-wide bucket under which the relative paths below live.
    pub datasets_bucket: String,
    pub all_samples_wgs_path: Option<String>,
    pub single_sample_array_path: Option<String>,
}

/// Workspace metadata supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkspaceContext {
    pub namespace: String,
    /// Display name.
    pub name: String,
    /// Identifier used by the workspace service.
    pub firecloud_name: String,
    pub firecloud_uuid: String,
    pub google_project: String,
    pub bucket_name: String,
    pub caller_is_owner: bool,
    pub terra_v2: bool,
    pub billing_migration: BillingMigrationStatus,
    pub cdr: CdrContext,
}

/// Variables shared by runtimes and apps.
pub fn build_environment(workspace: &WorkspaceContext) -> EnvironmentMap {
    let mut env = EnvironmentMap::new();
    env.insert(
        WORKSPACE_NAMESPACE_KEY.to_string(),
        workspace.namespace.clone(),
    );
    env.insert(
        WORKSPACE_BUCKET_KEY.to_string(),
        format!("gs://{}", workspace.bucket_name),
    );

    // Any value switches generated code to the BigQuery storage read API.
    if workspace.caller_is_owner || workspace.terra_v2 {
        env.insert(
            BIGQUERY_STORAGE_API_ENABLED_KEY.to_string(),
            "true".to_string(),
        );
    }

    if workspace.billing_migration != BillingMigrationStatus::Old {
        env.insert(
            WORKSPACE_CDR_KEY.to_string(),
            format!(
                "{}.{}",
                workspace.cdr.bigquery_project, workspace.cdr.bigquery_dataset
            ),
        );
    }

    let cdr = &workspace.cdr;
    if let Some(path) = &cdr.all_samples_wgs_path {
        env.insert(
            ALL_SAMPLES_WGS_KEY.to_string(),
            join_bucket_path(&cdr.datasets_bucket, path),
        );
    }
    if let Some(path) = &cdr.single_sample_array_path {
        env.insert(
            SINGLE_SAMPLE_ARRAY_BUCKET_KEY.to_string(),
            join_bucket_path(&cdr.datasets_bucket, path),
        );
    }

    env.insert(JUPYTER_DEBUG_LOGGING_KEY.to_string(), "true".to_string());
    env.insert(PYSPARK_PYTHON_KEY.to_string(), PYSPARK_PYTHON.to_string());
    env
}

/// Runtime variables plus the identifiers apps need but are not given by the
/// control plane.
pub fn build_app_environment(workspace: &WorkspaceContext, owner_email: &str) -> EnvironmentMap {
    let mut env = build_environment(workspace);
    // The control plane enforces one app per user per workspace using this key.
    env.insert(
        WORKSPACE_NAME_KEY.to_string(),
        workspace.firecloud_name.clone(),
    );
    env.insert(
        GOOGLE_PROJECT_KEY.to_string(),
        workspace.google_project.clone(),
    );
    env.insert(OWNER_EMAIL_KEY.to_string(), owner_email.to_string());
    env
}

fn join_bucket_path(bucket: &str, path: &str) -> String {
    format!(
        "{}/{}",
        bucket.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
