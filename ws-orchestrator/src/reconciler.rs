//! Out-of-band orphan sweep.
//!
//! Compares provider inventory against the record store to find billable
//! resources nothing accounts for. Runs on a schedule or on demand,
//! never through the queue, and never mutates workspace records. The
//! default is a dry-run report; deletion is a separate, explicit action.

use crate::error::Result;
use crate::workspace_id_from_name;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use ws_provider::{ComputeProvider, NetworkProvider};
use ws_store::WorkspaceStore;

/// One unaccounted external resource
#[derive(Debug, Clone)]
pub struct OrphanResource {
    pub external_id: String,
    pub name: String,
    pub age: chrono::Duration,
}

#[derive(Debug, Default)]
pub struct OrphanReport {
    pub volumes: Vec<OrphanResource>,
    pub servers: Vec<OrphanResource>,
    pub identities: Vec<OrphanResource>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty() && self.servers.is_empty() && self.identities.is_empty()
    }

    pub fn total(&self) -> usize {
        self.volumes.len() + self.servers.len() + self.identities.len()
    }
}

/// Result of an explicit cleanup pass
#[derive(Debug, Default)]
pub struct CleanupOutcome {
    pub deleted: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: WorkspaceStore,
    compute: Arc<dyn ComputeProvider>,
    network: Arc<dyn NetworkProvider>,
    /// Resources younger than this are never reported; protects
    /// provisioning runs that have created a resource but not yet
    /// persisted its id.
    min_age: Duration,
}

impl Reconciler {
    pub fn new(
        store: WorkspaceStore,
        compute: Arc<dyn ComputeProvider>,
        network: Arc<dyn NetworkProvider>,
        min_age: Duration,
    ) -> Self {
        Self {
            store,
            compute,
            network,
            min_age,
        }
    }

    /// Build the dry-run report. A resource is orphaned when it is older
    /// than the minimum age, its external id is unknown to the store,
    /// and its name does not resolve to a still-existing workspace.
    pub async fn scan(&self) -> Result<OrphanReport> {
        let min_age = chrono::Duration::from_std(self.min_age).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut report = OrphanReport::default();

        for volume in self.compute.list_volumes().await? {
            let age = now - volume.created_at;
            if age < min_age {
                continue;
            }
            if self.store.volume_external_id_exists(&volume.id).await? {
                continue;
            }
            if self.name_matches_live_workspace(&volume.name).await? {
                continue;
            }
            report.volumes.push(OrphanResource {
                external_id: volume.id,
                name: volume.name,
                age,
            });
        }

        for server in self.compute.list_servers().await? {
            let age = now - server.created_at;
            if age < min_age {
                continue;
            }
            if self.store.server_external_id_exists(&server.id).await? {
                continue;
            }
            if self.name_matches_live_workspace(&server.name).await? {
                continue;
            }
            report.servers.push(OrphanResource {
                external_id: server.id,
                name: server.name,
                age,
            });
        }

        // Overlay identities are keyed by hostname only; anything with
        // the workspace prefix but no live workspace is stale.
        for identity in self.network.list_identities().await? {
            let age = now - identity.created_at;
            if age < min_age {
                continue;
            }
            let Some(workspace_id) = workspace_id_from_name(&identity.hostname) else {
                continue;
            };
            if self.store.workspace_exists(workspace_id).await? {
                continue;
            }
            report.identities.push(OrphanResource {
                external_id: identity.id,
                name: identity.hostname,
                age,
            });
        }

        info!(
            volumes = report.volumes.len(),
            servers = report.servers.len(),
            identities = report.identities.len(),
            "Orphan scan complete"
        );
        Ok(report)
    }

    /// Delete everything in the report. Each attempt is logged with its
    /// own outcome; one failure never aborts the rest of the batch.
    pub async fn cleanup(&self, report: &OrphanReport) -> CleanupOutcome {
        let mut outcome = CleanupOutcome::default();

        for orphan in &report.servers {
            match self.compute.delete_server(&orphan.external_id).await {
                Ok(()) => {
                    info!(server_id = %orphan.external_id, "Deleted orphaned server");
                    outcome.deleted += 1;
                }
                Err(err) => {
                    error!(server_id = %orphan.external_id, "Failed to delete orphaned server: {}", err);
                    outcome.failed += 1;
                }
            }
        }

        for orphan in &report.volumes {
            match self.compute.delete_volume(&orphan.external_id).await {
                Ok(()) => {
                    info!(volume_id = %orphan.external_id, "Deleted orphaned volume");
                    outcome.deleted += 1;
                }
                Err(err) => {
                    error!(volume_id = %orphan.external_id, "Failed to delete orphaned volume: {}", err);
                    outcome.failed += 1;
                }
            }
        }

        for orphan in &report.identities {
            match self.network.delete_identity(&orphan.external_id).await {
                Ok(()) => {
                    info!(identity_id = %orphan.external_id, "Deleted orphaned identity");
                    outcome.deleted += 1;
                }
                Err(err) => {
                    error!(identity_id = %orphan.external_id, "Failed to delete orphaned identity: {}", err);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    /// One sweep: scan, and clean up only when explicitly asked to
    pub async fn run(&self, delete: bool) -> Result<OrphanReport> {
        let report = self.scan().await?;

        if delete && !report.is_empty() {
            let outcome = self.cleanup(&report).await;
            info!(
                deleted = outcome.deleted,
                failed = outcome.failed,
                "Orphan cleanup finished"
            );
        }

        Ok(report)
    }

    /// Fallback for resources whose naming convention embeds a workspace
    /// id prefix: skip them while that workspace still exists.
    async fn name_matches_live_workspace(&self, name: &str) -> Result<bool> {
        match workspace_id_from_name(name) {
            Some(workspace_id) => Ok(self.store.workspace_exists(workspace_id).await?),
            None => Ok(false),
        }
    }
}
