//! Removal of environments whose creators no longer have workspace access.
//!
//! The cached user set is only used to find candidates. Nothing is deleted
//! until the live ACL confirms the creator is gone, and the live ACL is
//! fetched at most once per workspace.

use crate::client::ComputeClient;
use crate::error::Result;
use crate::model::{ComputeResource, ResourceKind};
use crate::status::LifecycleStatus;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{error, info, instrument, warn};

/// Workspace the sweep runs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepTarget {
    pub namespace: String,
    pub firecloud_name: String,
    pub google_project: String,
}

/// Who has access to a workspace.
#[async_trait]
pub trait WorkspaceAcl: Send + Sync {
    /// Possibly stale user emails from a local cache.
    async fn cached_users(&self, workspace: &SweepTarget) -> Result<HashSet<String>>;

    /// Authoritative user emails, fetched live.
    async fn current_users(&self, workspace: &SweepTarget) -> Result<HashSet<String>>;
}

#[derive(Clone)]
pub struct EnvironmentSweeper {
    client: ComputeClient,
}

impl EnvironmentSweeper {
    pub fn new(client: ComputeClient) -> Self {
        Self { client }
    }

    /// Sweep each workspace in turn. Returns how many could not be swept
    /// because their live ACL (or their resource listing) was unavailable.
    pub async fn delete_unshared_batch(
        &self,
        workspaces: &[SweepTarget],
        acl: &dyn WorkspaceAcl,
    ) -> usize {
        let mut failed = 0;
        for workspace in workspaces {
            match self.delete_unshared(workspace, acl).await {
                Ok(true) => {}
                Ok(false) => failed += 1,
                Err(e) => {
                    error!(
                        workspace = %workspace.namespace,
                        error = %e,
                        "failed to sweep workspace"
                    );
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Delete runtimes, apps and then disks in `workspace` created by users
    /// who lost access. Returns `false` if the live ACL was needed but could
    /// not be fetched.
    ///
    /// Runtimes and apps go first since deleting them also deletes their
    /// disks.
    #[instrument(skip(self, acl), fields(workspace = %workspace.namespace))]
    pub async fn delete_unshared(
        &self,
        workspace: &SweepTarget,
        acl: &dyn WorkspaceAcl,
    ) -> Result<bool> {
        let project = workspace.google_project.as_str();
        let cached = acl.cached_users(workspace).await?;

        // Runtimes first, then apps.
        let resources: Vec<ComputeResource> = self
            .client
            .list_runtimes_by_project_as_service(project)
            .await?
            .into_iter()
            .map(ComputeResource::from)
            .chain(
                self.client
                    .list_apps_by_project_as_service(project)
                    .await?
                    .into_iter()
                    .map(ComputeResource::from),
            )
            .filter(ComputeResource::can_delete)
            .collect();

        let mut current = None;
        if resources.iter().any(|r| !cached.contains(r.creator())) {
            let Some(users) = fetch_current_users(acl, workspace).await else {
                return Ok(false);
            };

            let orphaned: Vec<_> = resources
                .iter()
                .filter(|r| !users.contains(r.creator()))
                .collect();
            if !orphaned.is_empty() {
                info!(count = orphaned.len(), "deleting unshared environments");
            }
            for resource in orphaned {
                let id = resource.id();
                let result = match resource.kind() {
                    ResourceKind::Runtime => {
                        self.client
                            .delete_runtime_as_service(project, &id.name, true)
                            .await
                    }
                    ResourceKind::App => {
                        self.client
                            .delete_app_as_service(project, &id.name, true)
                            .await
                    }
                };
                if let Err(e) = result {
                    warn!(
                        resource = %id,
                        kind = ?resource.kind(),
                        error = %e,
                        "failed to delete environment"
                    );
                }
            }

            current = Some(users);
        }

        let disks: Vec<_> = self
            .client
            .list_disks_by_project_as_service(project)
            .await?
            .into_iter()
            .filter(|d| d.status.can_delete())
            .collect();
        if disks.iter().all(|d| cached.contains(&d.audit_info.creator)) {
            return Ok(true);
        }

        let users = match current {
            Some(users) => users,
            None => match fetch_current_users(acl, workspace).await {
                Some(users) => users,
                None => return Ok(false),
            },
        };

        let orphaned: Vec<_> = disks
            .iter()
            .filter(|d| !users.contains(&d.audit_info.creator))
            .collect();
        if !orphaned.is_empty() {
            info!(count = orphaned.len(), "deleting unshared disks");
        }
        for disk in orphaned {
            if let Err(e) = self.client.delete_disk_as_service(project, &disk.name).await {
                warn!(disk = %disk.id(), error = %e, "failed to delete disk");
            }
        }

        Ok(true)
    }
}

async fn fetch_current_users(
    acl: &dyn WorkspaceAcl,
    workspace: &SweepTarget,
) -> Option<HashSet<String>> {
    match acl.current_users(workspace).await {
        Ok(users) => Some(users),
        Err(e) => {
            warn!(
                workspace = %workspace.namespace,
                name = %workspace.firecloud_name,
                error = %e,
                "failed to fetch workspace users"
            );
            None
        }
    }
}
