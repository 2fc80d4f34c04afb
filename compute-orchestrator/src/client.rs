//! The facade callers use to manage runtimes, apps and disks.
//!
//! Every method is a single pass: pick the credential, build the payload, run
//! it through the retry executor. Nothing is cached between calls.

use crate::config::{ComputeConfig, RuntimeDefaults};
use crate::control_plane::{
    ControlPlaneApi, CreateAppRequest, CreateRuntimeRequest, KubernetesRuntimeConfig, ListFilter,
    UpdateDiskRequest, UpdateRuntimeRequest,
};
use crate::credentials::{Credential, CredentialProvider};
use crate::disks::{DiskReconciler, DiskReconciliation};
use crate::environment::{build_app_environment, build_environment, WorkspaceContext};
use crate::error::{OrchestratorError, Result};
use crate::http::HttpControlPlane;
use crate::labels::{self, build_labels, configuration_labels, with_workspace_labels};
use crate::model::{
    App, AppType, PersistentDisk, PersistentDiskRequest, ResourceId, Runtime, RuntimeConfig,
    RuntimeConfigurationType,
};
use crate::retry::{CallKind, RetryExecutor};
use crate::status::{ensure_deletable, ensure_stoppable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const DEFAULT_BULK_CONCURRENCY: usize = 8;

/// Role filter restricting list calls to resources the caller created.
const CREATOR_ROLE: &str = "creator";

const USER_APP_PREFIX: &str = "all-of-us-";
const USER_DISK_PREFIX: &str = "all-of-us-pd-";
const NAME_SUFFIX_LEN: usize = 4;

/// A runtime as requested by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    pub google_project: String,
    pub runtime_name: String,
    #[serde(default)]
    pub configuration_type: Option<RuntimeConfigurationType>,
    pub runtime_config: RuntimeConfig,
    /// Minutes of inactivity before autopause. `None` disables autopause.
    #[serde(default)]
    pub autopause_threshold: Option<u32>,
}

/// An app as requested by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAppSpec {
    pub google_project: String,
    /// Numeric id of the requesting user, used to derive resource names.
    pub owner_id: u64,
    pub app_type: AppType,
    pub kubernetes_runtime_config: KubernetesRuntimeConfig,
    /// Disk to attach. Without a name a new disk is created.
    pub persistent_disk: PersistentDiskRequest,
    #[serde(default)]
    pub autodelete_enabled: bool,
    #[serde(default)]
    pub autodelete_threshold: Option<u32>,
}

/// Name of the app `owner_id` gets for `app_type`.
pub fn user_app_name(owner_id: u64, app_type: AppType) -> String {
    format!(
        "{USER_APP_PREFIX}{owner_id}-{}-{}",
        app_type.label_value(),
        name_suffix()
    )
}

/// Name of a fresh disk for an app of `app_type`.
pub fn user_app_disk_name(owner_id: u64, app_type: AppType) -> String {
    format!(
        "{USER_DISK_PREFIX}{owner_id}-{}-{}",
        app_type.label_value(),
        name_suffix()
    )
}

fn name_suffix() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(NAME_SUFFIX_LEN);
    id
}

#[derive(Clone)]
pub struct ComputeClient {
    pub(crate) api: Arc<dyn ControlPlaneApi>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) retry: RetryExecutor,
    runtime_defaults: RuntimeDefaults,
    pub(crate) bulk_concurrency: usize,
}

impl ComputeClient {
    pub fn new(
        api: Arc<dyn ControlPlaneApi>,
        credentials: Arc<dyn CredentialProvider>,
        retry: RetryExecutor,
        runtime_defaults: RuntimeDefaults,
    ) -> Self {
        Self {
            api,
            credentials,
            retry,
            runtime_defaults,
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }

    /// HTTP-backed client built from configuration.
    pub fn from_config(
        config: &ComputeConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let api = HttpControlPlane::new(&config.control_plane_url, config.request_timeout())?;
        Ok(Self::new(
            Arc::new(api),
            credentials,
            RetryExecutor::new(config.retry.policy()),
            config.runtime_defaults.clone(),
        )
        .with_bulk_concurrency(config.bulk_concurrency))
    }

    /// Cap on in-flight calls during bulk operations. Values below 1 are
    /// raised to 1.
    pub fn with_bulk_concurrency(mut self, limit: usize) -> Self {
        self.bulk_concurrency = limit.max(1);
        self
    }

    pub fn bulk_concurrency(&self) -> usize {
        self.bulk_concurrency
    }

    // --- runtimes ---

    #[instrument(skip_all, fields(project = %spec.google_project, runtime = %spec.runtime_name))]
    pub async fn create_runtime(&self, spec: &RuntimeSpec, workspace: &WorkspaceContext) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        let request = self.create_runtime_request(credential.principal(), spec, workspace);

        self.retry
            .execute(CallKind::Mutation, "create_runtime", || {
                self.api.create_runtime(
                    &credential,
                    &spec.google_project,
                    &spec.runtime_name,
                    &request,
                )
            })
            .await?;
        info!("runtime creation requested");
        Ok(())
    }

    fn create_runtime_request(
        &self,
        creator: &str,
        spec: &RuntimeSpec,
        workspace: &WorkspaceContext,
    ) -> CreateRuntimeRequest {
        let defaults = &self.runtime_defaults;
        let labels = with_workspace_labels(
            build_labels(creator, None, spec.configuration_type),
            &workspace.namespace,
            &workspace.name,
        );

        CreateRuntimeRequest {
            labels,
            default_client_id: defaults.default_client_id.clone(),
            jupyter_user_script_uri: defaults.user_script_uri(),
            jupyter_start_user_script_uri: defaults.start_user_script_uri(),
            user_jupyter_extensions: defaults.jupyter_extensions(),
            scopes: defaults.scopes(),
            tool_docker_image: defaults.tool_docker_image.clone(),
            custom_environment_variables: build_environment(workspace),
            // Setting autopause to false would disable it entirely, so it is
            // only sent alongside a threshold.
            autopause: spec.autopause_threshold.map(|_| true),
            autopause_threshold: spec.autopause_threshold,
            runtime_config: spec.runtime_config.clone(),
        }
    }

    #[instrument(skip_all, fields(project = %spec.google_project, runtime = %spec.runtime_name))]
    pub async fn update_runtime(&self, spec: &RuntimeSpec) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        let request = UpdateRuntimeRequest {
            allow_stop: true,
            runtime_config: spec.runtime_config.clone(),
            autopause: spec.autopause_threshold.is_some(),
            autopause_threshold: spec.autopause_threshold,
            labels_to_upsert: configuration_labels(spec.configuration_type),
        };

        self.retry
            .execute(CallKind::Mutation, "update_runtime", || {
                self.api.update_runtime(
                    &credential,
                    &spec.google_project,
                    &spec.runtime_name,
                    &request,
                )
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_runtime(
        &self,
        google_project: &str,
        runtime_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        self.delete_runtime_with(&credential, google_project, runtime_name, delete_disk)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_runtime_as_service(
        &self,
        google_project: &str,
        runtime_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        let credential = self.credentials.service().await?;
        self.delete_runtime_with(&credential, google_project, runtime_name, delete_disk)
            .await
    }

    async fn delete_runtime_with(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        self.retry
            .execute(CallKind::Mutation, "delete_runtime", || {
                self.api
                    .delete_runtime(credential, google_project, runtime_name, delete_disk)
            })
            .await
    }

    /// Used while polling a runtime that may still be coming up, so a 404 is
    /// logged quietly.
    #[instrument(skip(self))]
    pub async fn get_runtime(&self, google_project: &str, runtime_name: &str) -> Result<Runtime> {
        let credential = self.credentials.end_user().await?;
        self.retry
            .execute(CallKind::Poll, "get_runtime", || {
                self.api
                    .get_runtime(&credential, google_project, runtime_name)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_runtime_as_service(
        &self,
        google_project: &str,
        runtime_name: &str,
    ) -> Result<Runtime> {
        let credential = self.credentials.service().await?;
        self.retry
            .execute(CallKind::Read, "get_runtime", || {
                self.api
                    .get_runtime(&credential, google_project, runtime_name)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_runtimes_by_project(
        &self,
        google_project: &str,
        include_deleted: bool,
    ) -> Result<Vec<Runtime>> {
        let credential = self.credentials.end_user().await?;
        let filter = ListFilter::default().include_deleted(include_deleted);
        self.retry
            .execute(CallKind::Read, "list_runtimes_by_project", || {
                self.api
                    .list_runtimes_by_project(&credential, google_project, &filter)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_runtimes_by_project_as_service(
        &self,
        google_project: &str,
    ) -> Result<Vec<Runtime>> {
        let credential = self.credentials.service().await?;
        let filter = ListFilter::default();
        self.retry
            .execute(CallKind::Read, "list_runtimes_by_project", || {
                self.api
                    .list_runtimes_by_project(&credential, google_project, &filter)
            })
            .await
    }

    /// Stop `runtime` as the end user. Refused locally unless its last known
    /// status permits a stop.
    #[instrument(skip_all, fields(runtime = %runtime.id()))]
    pub async fn stop_runtime(&self, runtime: &Runtime) -> Result<()> {
        ensure_stoppable(&runtime.id().to_string(), runtime.status)?;
        let credential = self.credentials.end_user().await?;
        self.retry
            .execute(CallKind::Mutation, "stop_runtime", || {
                self.api
                    .stop_runtime(&credential, &runtime.google_project, &runtime.runtime_name)
            })
            .await
    }

    /// Delete `runtime` as the end user. Refused locally unless its last known
    /// status permits a delete.
    #[instrument(skip_all, fields(runtime = %runtime.id(), delete_disk = delete_disk))]
    pub async fn delete_runtime_checked(&self, runtime: &Runtime, delete_disk: bool) -> Result<()> {
        ensure_deletable(&runtime.id().to_string(), runtime.status)?;
        self.delete_runtime(&runtime.google_project, &runtime.runtime_name, delete_disk)
            .await
    }

    // --- apps ---

    /// Create an app for the end user and return its generated address.
    ///
    /// A request without a disk name asks for a new disk. That is refused when
    /// the user already has an active disk for the same app type, since the
    /// new app should reuse it.
    #[instrument(skip_all, fields(project = %spec.google_project, app_type = %spec.app_type))]
    pub async fn create_app(
        &self,
        spec: &CreateAppSpec,
        workspace: &WorkspaceContext,
    ) -> Result<ResourceId> {
        let credential = self.credentials.end_user().await?;
        let creator = credential.principal();
        let app_type = spec.app_type;

        let app_labels = with_workspace_labels(
            build_labels(creator, Some(app_type), None),
            &workspace.namespace,
            &workspace.name,
        );

        let mut disk = spec.persistent_disk.clone();
        labels::upsert_label(&mut disk.labels, labels::APP_TYPE, app_type.label_value());
        disk.labels = with_workspace_labels(disk.labels, &workspace.namespace, &workspace.name);

        if disk.name.as_deref().map_or(true, str::is_empty) {
            let app_disks: Vec<PersistentDisk> = self
                .list_creator_disks(&credential, &spec.google_project, false)
                .await?
                .into_iter()
                .filter(|d| !d.is_runtime_disk())
                .collect();
            let current = DiskReconciler.find_current_disks(&app_disks);
            if let Some(existing) = current.app_disk(app_type) {
                return Err(OrchestratorError::InvalidInput(format!(
                    "cannot create a new {app_type} disk while active disk '{}' exists",
                    existing.name
                )));
            }
            disk.name = Some(user_app_disk_name(spec.owner_id, app_type));
        }

        let request = CreateAppRequest {
            app_type,
            kubernetes_runtime_config: spec.kubernetes_runtime_config.clone(),
            disk_config: disk,
            custom_environment_variables: build_app_environment(workspace, creator),
            workspace_id: workspace.firecloud_uuid.clone(),
            labels: app_labels,
            autodelete_enabled: spec.autodelete_enabled,
            autodelete_threshold: spec.autodelete_threshold,
        };
        let app_name = user_app_name(spec.owner_id, app_type);

        self.retry
            .execute(CallKind::Mutation, "create_app", || {
                self.api
                    .create_app(&credential, &spec.google_project, &app_name, &request)
            })
            .await?;
        info!(app = %app_name, "app creation requested");
        Ok(ResourceId::new(&spec.google_project, app_name))
    }

    #[instrument(skip(self))]
    pub async fn get_app(&self, google_project: &str, app_name: &str) -> Result<App> {
        let credential = self.credentials.end_user().await?;
        self.retry
            .execute(CallKind::Read, "get_app", || {
                self.api.get_app(&credential, google_project, app_name)
            })
            .await
    }

    /// Apps in the project created by the end user.
    #[instrument(skip(self))]
    pub async fn list_apps_by_project(
        &self,
        google_project: &str,
        include_deleted: bool,
    ) -> Result<Vec<App>> {
        let credential = self.credentials.end_user().await?;
        let filter = ListFilter::default()
            .include_deleted(include_deleted)
            .include_labels(labels::APP_LABEL_KEYS)
            .role(CREATOR_ROLE);
        self.retry
            .execute(CallKind::Read, "list_apps_by_project", || {
                self.api
                    .list_apps_by_project(&credential, google_project, &filter)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_apps_by_project_as_service(&self, google_project: &str) -> Result<Vec<App>> {
        let credential = self.credentials.service().await?;
        let filter = ListFilter::default().include_labels(labels::APP_LABEL_KEYS);
        self.retry
            .execute(CallKind::Read, "list_apps_by_project", || {
                self.api
                    .list_apps_by_project(&credential, google_project, &filter)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_app(
        &self,
        google_project: &str,
        app_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        self.delete_app_with(&credential, google_project, app_name, delete_disk)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_app_as_service(
        &self,
        google_project: &str,
        app_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        let credential = self.credentials.service().await?;
        self.delete_app_with(&credential, google_project, app_name, delete_disk)
            .await
    }

    pub(crate) async fn delete_app_with(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        delete_disk: bool,
    ) -> Result<()> {
        self.retry
            .execute(CallKind::Mutation, "delete_app", || {
                self.api
                    .delete_app(credential, google_project, app_name, delete_disk)
            })
            .await
    }

    #[instrument(skip_all, fields(app = %app.id(), delete_disk = delete_disk))]
    pub async fn delete_app_checked(&self, app: &App, delete_disk: bool) -> Result<()> {
        ensure_deletable(&app.id().to_string(), app.status)?;
        self.delete_app(&app.google_project, &app.app_name, delete_disk)
            .await
    }

    // --- disks ---

    #[instrument(skip(self))]
    pub async fn get_disk(&self, google_project: &str, disk_name: &str) -> Result<PersistentDisk> {
        let credential = self.credentials.end_user().await?;
        self.retry
            .execute(CallKind::Read, "get_disk", || {
                self.api.get_disk(&credential, google_project, disk_name)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn update_disk(&self, google_project: &str, disk_name: &str, size_gb: u32) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        let request = UpdateDiskRequest { size: size_gb };
        self.retry
            .execute(CallKind::Mutation, "update_disk", || {
                self.api
                    .update_disk(&credential, google_project, disk_name, &request)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_disk(&self, google_project: &str, disk_name: &str) -> Result<()> {
        let credential = self.credentials.end_user().await?;
        self.delete_disk_with(&credential, google_project, disk_name)
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_disk_as_service(&self, google_project: &str, disk_name: &str) -> Result<()> {
        let credential = self.credentials.service().await?;
        self.delete_disk_with(&credential, google_project, disk_name)
            .await
    }

    async fn delete_disk_with(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> Result<()> {
        self.retry
            .execute(CallKind::Mutation, "delete_disk", || {
                self.api.delete_disk(credential, google_project, disk_name)
            })
            .await
    }

    #[instrument(skip_all, fields(disk = %disk.id()))]
    pub async fn delete_disk_checked(&self, disk: &PersistentDisk) -> Result<()> {
        ensure_deletable(&disk.id().to_string(), disk.status)?;
        self.delete_disk(&disk.google_project, &disk.name).await
    }

    /// Disks in the project created by the end user.
    #[instrument(skip(self))]
    pub async fn list_disks_by_project(
        &self,
        google_project: &str,
        include_deleted: bool,
    ) -> Result<Vec<PersistentDisk>> {
        let credential = self.credentials.end_user().await?;
        self.list_creator_disks(&credential, google_project, include_deleted)
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_disks_by_project_as_service(
        &self,
        google_project: &str,
    ) -> Result<Vec<PersistentDisk>> {
        let credential = self.credentials.service().await?;
        let filter = ListFilter::default().include_labels(labels::DISK_LABEL_KEYS);
        self.retry
            .execute(CallKind::Read, "list_disks_by_project", || {
                self.api
                    .list_disks_by_project(&credential, google_project, &filter)
            })
            .await
    }

    async fn list_creator_disks(
        &self,
        credential: &Credential,
        google_project: &str,
        include_deleted: bool,
    ) -> Result<Vec<PersistentDisk>> {
        let filter = ListFilter::default()
            .include_deleted(include_deleted)
            .include_labels(labels::DISK_LABEL_KEYS)
            .role(CREATOR_ROLE);
        self.retry
            .execute(CallKind::Read, "list_disks_by_project", || {
                self.api
                    .list_disks_by_project(credential, google_project, &filter)
            })
            .await
    }

    /// The end user's current disk per slot in `google_project`.
    #[instrument(skip(self))]
    pub async fn find_current_disks(&self, google_project: &str) -> Result<DiskReconciliation> {
        let disks = self.list_disks_by_project(google_project, false).await?;
        Ok(DiskReconciler.find_current_disks(&disks))
    }

    // --- health ---

    /// Whether the control plane reports itself healthy. Never fails.
    #[instrument(skip(self))]
    pub async fn get_control_plane_health(&self) -> bool {
        let result = match self.credentials.service().await {
            Ok(credential) => {
                self.retry
                    .execute(CallKind::Read, "system_status", || {
                        self.api.system_status(&credential)
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "control plane health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_names() {
        let app = user_app_name(42, AppType::Rstudio);
        assert!(app.starts_with("all-of-us-42-rstudio-"), "{app}");
        assert_eq!(app.len(), "all-of-us-42-rstudio-".len() + NAME_SUFFIX_LEN);

        let disk = user_app_disk_name(42, AppType::Sas);
        assert!(disk.starts_with("all-of-us-pd-42-sas-"), "{disk}");
    }

    #[test]
    fn test_runtime_spec_deserializes() {
        let spec: RuntimeSpec = serde_json::from_value(serde_json::json!({
            "googleProject": "wb-proj-1",
            "runtimeName": "all-of-us-42",
            "configurationType": "general_analysis",
            "runtimeConfig": {
                "cloudService": "GCE",
                "machineType": "n1-standard-4",
                "diskSizeGb": 100
            },
            "autopauseThreshold": 30
        }))
        .unwrap();
        assert_eq!(
            spec.configuration_type,
            Some(RuntimeConfigurationType::GeneralAnalysis)
        );
        assert_eq!(spec.autopause_threshold, Some(30));
    }
}
