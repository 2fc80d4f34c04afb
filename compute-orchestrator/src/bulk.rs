//! Operations fanned out over every resource a user owns.
//!
//! Targets are listed with the service credential, filtered locally, then
//! acted on concurrently (at most `bulk_concurrency` calls in flight) with one
//! credential minted for the user and shared read-only by every task. All
//! targets are attempted; failures are collected rather than short-circuiting.

use crate::client::ComputeClient;
use crate::control_plane::ListFilter;
use crate::credentials::Credential;
use crate::error::{OrchestratorError, Result};
use crate::labels::{self, created_by_filter};
use crate::model::{AppType, ResourceId};
use crate::retry::CallKind;
use crate::status::LifecycleStatus;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Succeeded,
    Failed(String),
}

/// Per-target results of a bulk operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkStopOutcome {
    pub results: BTreeMap<ResourceId, TargetOutcome>,
}

impl BulkStopOutcome {
    pub fn record(&mut self, id: ResourceId, result: Result<()>) {
        let outcome = match result {
            Ok(()) => TargetOutcome::Succeeded,
            Err(e) => TargetOutcome::Failed(e.to_string()),
        };
        self.results.insert(id, outcome);
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .values()
            .filter(|o| matches!(o, TargetOutcome::Succeeded))
            .count()
    }

    pub fn failed(&self) -> Vec<&ResourceId> {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, TargetOutcome::Failed(_)))
            .map(|(id, _)| id)
            .collect()
    }

    /// `Ok(successes)` when nothing failed, else an aggregate error naming
    /// every failed target.
    pub fn into_result(self) -> Result<usize> {
        let failed: Vec<String> = self.failed().iter().map(|id| id.to_string()).collect();
        if failed.is_empty() {
            Ok(self.succeeded())
        } else {
            Err(OrchestratorError::BulkOperation {
                succeeded: self.succeeded(),
                failed,
            })
        }
    }
}

impl ComputeClient {
    /// Stop every stoppable runtime created by `user_email`, acting as that
    /// user. Returns how many were stopped.
    #[instrument(skip(self))]
    pub async fn stop_all_runtimes_for_user(&self, user_email: &str) -> Result<usize> {
        self.stop_all_runtimes_for_user_outcome(user_email)
            .await?
            .into_result()
    }

    /// Same as [`ComputeClient::stop_all_runtimes_for_user`] but reports each
    /// target instead of aggregating.
    pub async fn stop_all_runtimes_for_user_outcome(
        &self,
        user_email: &str,
    ) -> Result<BulkStopOutcome> {
        let service = self.credentials.service().await?;
        let filter = ListFilter::labels(created_by_filter(user_email));
        let runtimes = self
            .retry
            .execute(CallKind::Read, "list_runtimes", || {
                self.api.list_runtimes(&service, &filter)
            })
            .await?;

        let targets: Vec<ResourceId> = runtimes
            .into_iter()
            .filter(|r| r.status.can_stop())
            .filter(|r| {
                // The label filter is only a heuristic; the audit record is
                // authoritative.
                if r.audit_info.creator == user_email {
                    true
                } else {
                    warn!(
                        runtime = %r.id(),
                        creator = %r.audit_info.creator,
                        requested = user_email,
                        "runtime labelled with another creator, skipping"
                    );
                    false
                }
            })
            .map(|r| r.id())
            .collect();

        if targets.is_empty() {
            info!(user = user_email, "no stoppable runtimes");
            return Ok(BulkStopOutcome::default());
        }

        let credential = Arc::new(self.credentials.impersonate(user_email).await?);
        let outcome = self
            .run_bulk(targets, |id| {
                let credential = Arc::clone(&credential);
                async move {
                    let result = self.stop_runtime_with(&credential, &id).await;
                    if let Err(e) = &result {
                        error!(runtime = %id, error = %e, "failed to stop runtime");
                    }
                    (id, result)
                }
            })
            .await;

        info!(
            user = user_email,
            stopped = outcome.succeeded(),
            failed = outcome.failed().len(),
            "stopped user runtimes"
        );
        Ok(outcome)
    }

    /// Delete every deletable app created by `user_email` using the service
    /// credential. Cromwell apps are left alone and disks are kept.
    #[instrument(skip(self))]
    pub async fn delete_user_apps_as_service(&self, user_email: &str) -> Result<usize> {
        let service = Arc::new(self.credentials.service().await?);
        let filter = ListFilter::labels(created_by_filter(user_email))
            .include_labels(labels::APP_LABEL_KEYS);
        let apps = self
            .retry
            .execute(CallKind::Read, "list_apps", || {
                self.api.list_apps(&service, &filter)
            })
            .await?;

        let targets: Vec<ResourceId> = apps
            .into_iter()
            .filter(|a| a.status.can_delete())
            .filter(|a| a.resolved_app_type() != Some(AppType::Cromwell))
            .filter(|a| {
                if a.audit_info.creator == user_email {
                    true
                } else {
                    warn!(
                        app = %a.id(),
                        creator = %a.audit_info.creator,
                        requested = user_email,
                        "app labelled with another creator, skipping"
                    );
                    false
                }
            })
            .map(|a| a.id())
            .collect();

        let outcome = self
            .run_bulk(targets, |id| {
                let service = Arc::clone(&service);
                async move {
                    let result = self
                        .delete_app_with(&service, &id.google_project, &id.name, false)
                        .await;
                    if let Err(e) = &result {
                        error!(app = %id, error = %e, "failed to delete app");
                    }
                    (id, result)
                }
            })
            .await;

        info!(
            user = user_email,
            deleted = outcome.succeeded(),
            failed = outcome.failed().len(),
            "deleted user apps"
        );
        outcome.into_result()
    }

    async fn stop_runtime_with(&self, credential: &Credential, id: &ResourceId) -> Result<()> {
        self.retry
            .execute(CallKind::Mutation, "stop_runtime", || {
                self.api
                    .stop_runtime(credential, &id.google_project, &id.name)
            })
            .await
    }

    async fn run_bulk<F, Fut>(&self, targets: Vec<ResourceId>, task: F) -> BulkStopOutcome
    where
        F: FnMut(ResourceId) -> Fut,
        Fut: std::future::Future<Output = (ResourceId, Result<()>)>,
    {
        let results: Vec<(ResourceId, Result<()>)> = stream::iter(targets)
            .map(task)
            .buffer_unordered(self.bulk_concurrency)
            .collect()
            .await;

        let mut outcome = BulkStopOutcome::default();
        for (id, result) in results {
            outcome.record(id, result);
        }
        outcome
    }
}
