//! In-memory collaborators for tests. Enabled with the `test-utils` feature.

use crate::control_plane::{
    ControlPlaneApi, CreateAppRequest, CreateRuntimeRequest, ListFilter, RemoteFailure,
    RemoteResult, UpdateDiskRequest, UpdateRuntimeRequest,
};
use crate::credentials::{Credential, CredentialProvider};
use crate::error::{OrchestratorError, Result};
use crate::labels::LabelSet;
use crate::model::{App, AuditInfo, PersistentDisk, Runtime};
use crate::status::{AppStatus, DiskStatus, RuntimeStatus};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One call received by [`FakeControlPlane`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: &'static str,
    /// `project/name`, `project` or empty, depending on the call.
    pub target: String,
    pub principal: String,
}

#[derive(Default)]
struct FakeState {
    runtimes: Vec<Runtime>,
    apps: Vec<App>,
    disks: Vec<PersistentDisk>,
    calls: Vec<RecordedCall>,
    failures: HashMap<(&'static str, String), RemoteFailure>,
}

/// Control plane backed by in-memory vectors. Every call is recorded, and
/// failures can be injected per operation and target.
#[derive(Default)]
pub struct FakeControlPlane {
    state: Mutex<FakeState>,
    mutation_latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter when a slow call completes.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `stop_runtime` and `delete_app` sleep for `latency` before
    /// answering, so overlapping calls can be observed.
    pub fn with_mutation_latency(mut self, latency: Duration) -> Self {
        self.mutation_latency = Some(latency);
        self
    }

    /// Highest number of `stop_runtime`/`delete_app` calls seen in flight at
    /// once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn slow_mutation(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.mutation_latency {
            tokio::time::sleep(latency).await;
        }
        InFlight(&self.in_flight)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_runtime(&self, runtime: Runtime) {
        self.state().runtimes.push(runtime);
    }

    pub fn add_app(&self, app: App) {
        self.state().apps.push(app);
    }

    pub fn add_disk(&self, disk: PersistentDisk) {
        self.state().disks.push(disk);
    }

    /// Make every `operation` call on `target` fail with `failure`.
    pub fn fail(&self, operation: &'static str, target: impl Into<String>, failure: RemoteFailure) {
        self.state()
            .failures
            .insert((operation, target.into()), failure);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<RecordedCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    pub fn runtimes(&self) -> Vec<Runtime> {
        self.state().runtimes.clone()
    }

    pub fn apps(&self) -> Vec<App> {
        self.state().apps.clone()
    }

    pub fn disks(&self) -> Vec<PersistentDisk> {
        self.state().disks.clone()
    }

    fn record(
        &self,
        operation: &'static str,
        target: String,
        credential: &Credential,
    ) -> RemoteResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(RecordedCall {
            operation,
            target: target.clone(),
            principal: credential.principal().to_string(),
        });
        match state.failures.get(&(operation, target)).cloned() {
            Some(failure) => Err(failure),
            None => Ok(state),
        }
    }
}

fn target(google_project: &str, name: &str) -> String {
    format!("{google_project}/{name}")
}

fn not_found(what: &str, google_project: &str, name: &str) -> RemoteFailure {
    RemoteFailure::status(404, format!("{what} {google_project}/{name} not found"))
}

fn matches_filter(
    labels: &LabelSet,
    creator: &str,
    deleted: bool,
    filter: &ListFilter,
    credential: &Credential,
) -> bool {
    if deleted && !filter.include_deleted {
        return false;
    }
    if filter.role.as_deref() == Some("creator") && creator != credential.principal() {
        return false;
    }
    filter.labels.as_deref().map_or(true, |predicates| {
        predicates
            .split(',')
            .filter_map(|p| p.split_once('='))
            .all(|(k, v)| labels.get(k).map(String::as_str) == Some(v))
    })
}

#[async_trait]
impl ControlPlaneApi for FakeControlPlane {
    async fn create_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &CreateRuntimeRequest,
    ) -> RemoteResult<()> {
        let mut state = self.record(
            "create_runtime",
            target(google_project, runtime_name),
            credential,
        )?;
        state.runtimes.push(Runtime {
            google_project: google_project.to_string(),
            runtime_name: runtime_name.to_string(),
            status: RuntimeStatus::Creating,
            audit_info: AuditInfo::new(credential.principal(), Utc::now()),
            labels: request.labels.clone(),
            disk_name: None,
            runtime_config: Some(request.runtime_config.clone()),
            autopause_threshold: request.autopause_threshold,
        });
        Ok(())
    }

    async fn get_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<Runtime> {
        let state = self.record(
            "get_runtime",
            target(google_project, runtime_name),
            credential,
        )?;
        state
            .runtimes
            .iter()
            .find(|r| r.google_project == google_project && r.runtime_name == runtime_name)
            .cloned()
            .ok_or_else(|| not_found("runtime", google_project, runtime_name))
    }

    async fn update_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        request: &UpdateRuntimeRequest,
    ) -> RemoteResult<()> {
        let mut state = self.record(
            "update_runtime",
            target(google_project, runtime_name),
            credential,
        )?;
        let runtime = state
            .runtimes
            .iter_mut()
            .find(|r| r.google_project == google_project && r.runtime_name == runtime_name)
            .ok_or_else(|| not_found("runtime", google_project, runtime_name))?;
        runtime.runtime_config = Some(request.runtime_config.clone());
        runtime.autopause_threshold = request.autopause_threshold;
        runtime.labels.extend(request.labels_to_upsert.clone());
        Ok(())
    }

    async fn delete_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
        _delete_disk: bool,
    ) -> RemoteResult<()> {
        let mut state = self.record(
            "delete_runtime",
            target(google_project, runtime_name),
            credential,
        )?;
        let runtime = state
            .runtimes
            .iter_mut()
            .find(|r| r.google_project == google_project && r.runtime_name == runtime_name)
            .ok_or_else(|| not_found("runtime", google_project, runtime_name))?;
        runtime.status = RuntimeStatus::Deleting;
        Ok(())
    }

    async fn stop_runtime(
        &self,
        credential: &Credential,
        google_project: &str,
        runtime_name: &str,
    ) -> RemoteResult<()> {
        let _in_flight = self.slow_mutation().await;
        let mut state = self.record(
            "stop_runtime",
            target(google_project, runtime_name),
            credential,
        )?;
        let runtime = state
            .runtimes
            .iter_mut()
            .find(|r| r.google_project == google_project && r.runtime_name == runtime_name)
            .ok_or_else(|| not_found("runtime", google_project, runtime_name))?;
        runtime.status = RuntimeStatus::Stopping;
        Ok(())
    }

    async fn list_runtimes(
        &self,
        credential: &Credential,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>> {
        let state = self.record("list_runtimes", String::new(), credential)?;
        Ok(state
            .runtimes
            .iter()
            .filter(|r| {
                matches_filter(
                    &r.labels,
                    &r.audit_info.creator,
                    r.status == RuntimeStatus::Deleted,
                    filter,
                    credential,
                )
            })
            .cloned()
            .collect())
    }

    async fn list_runtimes_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<Runtime>> {
        let state = self.record(
            "list_runtimes_by_project",
            google_project.to_string(),
            credential,
        )?;
        Ok(state
            .runtimes
            .iter()
            .filter(|r| r.google_project == google_project)
            .filter(|r| {
                matches_filter(
                    &r.labels,
                    &r.audit_info.creator,
                    r.status == RuntimeStatus::Deleted,
                    filter,
                    credential,
                )
            })
            .cloned()
            .collect())
    }

    async fn create_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        request: &CreateAppRequest,
    ) -> RemoteResult<()> {
        let mut state = self.record("create_app", target(google_project, app_name), credential)?;
        let disk_name = request.disk_config.name.clone();
        state.apps.push(App {
            google_project: google_project.to_string(),
            app_name: app_name.to_string(),
            app_type: Some(request.app_type),
            status: AppStatus::Provisioning,
            audit_info: AuditInfo::new(credential.principal(), Utc::now()),
            labels: request.labels.clone(),
            disk_name: disk_name.clone(),
        });
        if let Some(name) = disk_name {
            let exists = state
                .disks
                .iter()
                .any(|d| d.google_project == google_project && d.name == name);
            if !exists {
                state.disks.push(PersistentDisk {
                    google_project: google_project.to_string(),
                    name,
                    size_gb: request.disk_config.size_gb,
                    disk_type: request.disk_config.disk_type,
                    status: DiskStatus::Creating,
                    audit_info: AuditInfo::new(credential.principal(), Utc::now()),
                    labels: request.disk_config.labels.clone(),
                });
            }
        }
        Ok(())
    }

    async fn get_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
    ) -> RemoteResult<App> {
        let state = self.record("get_app", target(google_project, app_name), credential)?;
        state
            .apps
            .iter()
            .find(|a| a.google_project == google_project && a.app_name == app_name)
            .cloned()
            .ok_or_else(|| not_found("app", google_project, app_name))
    }

    async fn delete_app(
        &self,
        credential: &Credential,
        google_project: &str,
        app_name: &str,
        _delete_disk: bool,
    ) -> RemoteResult<()> {
        let _in_flight = self.slow_mutation().await;
        let mut state = self.record("delete_app", target(google_project, app_name), credential)?;
        let app = state
            .apps
            .iter_mut()
            .find(|a| a.google_project == google_project && a.app_name == app_name)
            .ok_or_else(|| not_found("app", google_project, app_name))?;
        app.status = AppStatus::Deleting;
        Ok(())
    }

    async fn list_apps(&self, credential: &Credential, filter: &ListFilter) -> RemoteResult<Vec<App>> {
        let state = self.record("list_apps", String::new(), credential)?;
        Ok(state
            .apps
            .iter()
            .filter(|a| {
                matches_filter(
                    &a.labels,
                    &a.audit_info.creator,
                    a.status == AppStatus::Deleted,
                    filter,
                    credential,
                )
            })
            .cloned()
            .collect())
    }

    async fn list_apps_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<App>> {
        let state = self.record(
            "list_apps_by_project",
            google_project.to_string(),
            credential,
        )?;
        Ok(state
            .apps
            .iter()
            .filter(|a| a.google_project == google_project)
            .filter(|a| {
                matches_filter(
                    &a.labels,
                    &a.audit_info.creator,
                    a.status == AppStatus::Deleted,
                    filter,
                    credential,
                )
            })
            .cloned()
            .collect())
    }

    async fn get_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<PersistentDisk> {
        let state = self.record("get_disk", target(google_project, disk_name), credential)?;
        state
            .disks
            .iter()
            .find(|d| d.google_project == google_project && d.name == disk_name)
            .cloned()
            .ok_or_else(|| not_found("disk", google_project, disk_name))
    }

    async fn update_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
        request: &UpdateDiskRequest,
    ) -> RemoteResult<()> {
        let mut state = self.record("update_disk", target(google_project, disk_name), credential)?;
        let disk = state
            .disks
            .iter_mut()
            .find(|d| d.google_project == google_project && d.name == disk_name)
            .ok_or_else(|| not_found("disk", google_project, disk_name))?;
        disk.size_gb = request.size;
        Ok(())
    }

    async fn delete_disk(
        &self,
        credential: &Credential,
        google_project: &str,
        disk_name: &str,
    ) -> RemoteResult<()> {
        let mut state = self.record("delete_disk", target(google_project, disk_name), credential)?;
        let disk = state
            .disks
            .iter_mut()
            .find(|d| d.google_project == google_project && d.name == disk_name)
            .ok_or_else(|| not_found("disk", google_project, disk_name))?;
        disk.status = DiskStatus::Deleting;
        Ok(())
    }

    async fn list_disks_by_project(
        &self,
        credential: &Credential,
        google_project: &str,
        filter: &ListFilter,
    ) -> RemoteResult<Vec<PersistentDisk>> {
        let state = self.record(
            "list_disks_by_project",
            google_project.to_string(),
            credential,
        )?;
        Ok(state
            .disks
            .iter()
            .filter(|d| d.google_project == google_project)
            .filter(|d| {
                matches_filter(
                    &d.labels,
                    &d.audit_info.creator,
                    d.status == DiskStatus::Deleted,
                    filter,
                    credential,
                )
            })
            .cloned()
            .collect())
    }

    async fn system_status(&self, credential: &Credential) -> RemoteResult<()> {
        drop(self.record("system_status", String::new(), credential)?);
        Ok(())
    }
}

/// Fixed credentials. Impersonation hands out a token for the requested
/// email and counts how often it was asked.
#[derive(Debug)]
pub struct StaticCredentials {
    user: Credential,
    service: Credential,
    allow_impersonation: bool,
    impersonations: AtomicUsize,
}

impl StaticCredentials {
    pub fn new(user_email: &str) -> Self {
        Self {
            user: Credential::new(user_email, "user-token"),
            service: Credential::new("service@workbench.example.org", "service-token"),
            allow_impersonation: true,
            impersonations: AtomicUsize::new(0),
        }
    }

    pub fn without_impersonation(mut self) -> Self {
        self.allow_impersonation = false;
        self
    }

    pub fn service_principal(&self) -> &str {
        self.service.principal()
    }

    pub fn impersonations(&self) -> usize {
        self.impersonations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn end_user(&self) -> Result<Credential> {
        Ok(self.user.clone())
    }

    async fn service(&self) -> Result<Credential> {
        Ok(self.service.clone())
    }

    async fn impersonate(&self, email: &str) -> Result<Credential> {
        if !self.allow_impersonation {
            return Err(OrchestratorError::Credential(format!(
                "impersonation of {email} is not allowed"
            )));
        }
        self.impersonations.fetch_add(1, Ordering::SeqCst);
        Ok(Credential::new(email, "impersonated-token"))
    }
}
