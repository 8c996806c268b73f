//! The destroy workflow: symmetric teardown of a workspace's external
//! resources. Every provider call is id-keyed and missing-on-provider is
//! treated as already-deleted, so a partially completed run is safely
//! retryable with the same ids.

use crate::error::{OrchestratorError, Result};
use crate::{workspace_hostname, Orchestrator};
use tracing::{debug, info, warn};
use ws_queue::Job;
use ws_store::{CostEventType, InstanceStatus, ResourceType, WorkspaceStatus};

#[derive(Debug, Clone)]
pub struct DestroyRequest {
    pub workspace_id: String,
    pub owner_id: String,
    /// External ids known to the enqueuer; fall back to the store when
    /// absent (a retry after the store rows were already cleared).
    pub external_server_id: Option<String>,
    pub external_volume_id: Option<String>,
    /// Remove the workspace records entirely instead of suspending
    pub delete_after_destroy: bool,
}

impl From<&Job> for DestroyRequest {
    fn from(job: &Job) -> Self {
        Self {
            workspace_id: job.workspace_id.clone(),
            owner_id: job.owner_id.clone(),
            external_server_id: job.external_server_id.clone(),
            external_volume_id: job.external_volume_id.clone(),
            delete_after_destroy: job.delete_after_destroy,
        }
    }
}

impl Orchestrator {
    /// Tear the workspace down. Suspend keeps the volume for a later
    /// resume; `delete_after_destroy` removes the volume and all records.
    pub async fn destroy(&self, req: &DestroyRequest) -> Result<()> {
        let workspace = self.store.get_workspace(&req.workspace_id).await?;

        if workspace.owner_id != req.owner_id {
            return Err(OrchestratorError::NotOwned {
                workspace_id: req.workspace_id.clone(),
                owner_id: req.owner_id.clone(),
            });
        }

        let resources = self.store.workspace_resources(&req.workspace_id).await?;

        let already_stopped = workspace.status == WorkspaceStatus::Suspended
            && resources.instance.status == InstanceStatus::Stopped;
        if already_stopped && !req.delete_after_destroy {
            return Err(OrchestratorError::InvalidState(format!(
                "workspace {} is already stopped",
                req.workspace_id
            )));
        }

        info!(
            workspace_id = %req.workspace_id,
            delete_after_destroy = req.delete_after_destroy,
            "Destroying workspace"
        );
        self.store
            .update_instance_status(&req.workspace_id, InstanceStatus::Stopping)
            .await?;

        // Server teardown, id-keyed and idempotent
        let server_id = req
            .external_server_id
            .clone()
            .or(resources.instance.external_server_id.clone());
        if let Some(server_id) = server_id {
            match self.compute.delete_server(&server_id).await {
                Ok(()) => {
                    self.emit_cost(ResourceType::Server, &server_id, CostEventType::Stop)
                        .await?;
                    info!(server_id = %server_id, "Server deleted");
                }
                Err(err) if err.is_not_found() => {
                    debug!(server_id = %server_id, "Server already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }

        // The overlay identity is tied to the server's lifetime; removing
        // it is best-effort since a stale entry is caught by the
        // reconciler anyway.
        let hostname = workspace_hostname(&req.workspace_id);
        match self.network.get_identity_by_hostname(&hostname).await {
            Ok(Some(identity)) => {
                if let Err(err) = self.network.delete_identity(&identity.id).await {
                    if !err.is_not_found() {
                        warn!(hostname, "Failed to remove overlay identity: {}", err);
                    }
                }
            }
            Ok(None) => {}
            Err(err) => warn!(hostname, "Overlay identity lookup failed: {}", err),
        }

        if req.delete_after_destroy {
            // Full delete: the volume goes too, then all records
            let volume_id = req
                .external_volume_id
                .clone()
                .or(resources.volume.external_volume_id.clone());
            if let Some(volume_id) = volume_id {
                match self.compute.delete_volume(&volume_id).await {
                    Ok(()) => {
                        self.emit_cost(ResourceType::Volume, &volume_id, CostEventType::Delete)
                            .await?;
                        info!(volume_id = %volume_id, "Volume deleted");
                    }
                    Err(err) if err.is_not_found() => {
                        debug!(volume_id = %volume_id, "Volume already gone");
                    }
                    Err(err) => return Err(err.into()),
                }
            }

            self.store
                .delete_workspace_records(&req.workspace_id)
                .await?;
            info!(workspace_id = %req.workspace_id, "Workspace records removed");
        } else {
            // Suspend: volume retained for resume
            self.store
                .record_instance_stopped(&req.workspace_id)
                .await?;
            self.store
                .update_workspace_status(&req.workspace_id, WorkspaceStatus::Suspended)
                .await?;
            info!(workspace_id = %req.workspace_id, "Workspace suspended");
        }

        Ok(())
    }
}
