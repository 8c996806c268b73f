//! The provision workflow: credential, volume, bootstrap, server,
//! overlay identity, ready — with compensating cleanup on any failure
//! after the workspace is marked provisioning.

use crate::bootstrap::BootstrapConfig;
use crate::error::{OrchestratorError, Result};
use crate::{workspace_hostname, Orchestrator};
use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use tracing::{debug, info, warn};
use ws_provider::{CredentialSpec, ServerSpec, ServerStatus, VolumeSpec};
use ws_store::{
    CostEvent, CostEventType, InstanceStatus, ResourceType, Workspace, WorkspaceStatus,
};

/// External resources created by one provisioning run. Compensation only
/// ever touches what this run created; a reused volume is never deleted
/// because this run does not own it.
#[derive(Default)]
struct ProvisionAttempt {
    hostname: String,
    credential_id: Option<String>,
    server_id: Option<String>,
}

impl Orchestrator {
    /// Provision the workspace: allocate a network credential, the
    /// volume and the VM, wait for readiness, and record the final
    /// state. Individually retried by the queue on total failure; every
    /// step is idempotent or compensated.
    pub async fn provision(&self, workspace_id: &str, owner_id: &str) -> Result<()> {
        let workspace = self.store.get_workspace(workspace_id).await?;

        if workspace.owner_id != owner_id {
            return Err(OrchestratorError::NotOwned {
                workspace_id: workspace_id.to_string(),
                owner_id: owner_id.to_string(),
            });
        }
        if matches!(
            workspace.status,
            WorkspaceStatus::Provisioning | WorkspaceStatus::Ready
        ) {
            return Err(OrchestratorError::InvalidState(format!(
                "workspace {} is already {:?}",
                workspace_id, workspace.status
            )));
        }
        if self.config.server_image.is_empty() {
            return Err(OrchestratorError::MissingConfig("server image"));
        }

        info!(workspace_id, owner_id, "Provisioning workspace");
        self.store
            .update_workspace_status(workspace_id, WorkspaceStatus::Provisioning)
            .await?;
        self.store
            .update_instance_status(workspace_id, InstanceStatus::Starting)
            .await?;

        let mut attempt = ProvisionAttempt {
            hostname: workspace_hostname(workspace_id),
            ..Default::default()
        };

        match self.provision_inner(&workspace, &mut attempt).await {
            Ok(()) => {
                info!(workspace_id, "Workspace ready");
                Ok(())
            }
            Err(err) => {
                warn!(workspace_id, "Provisioning failed: {}", err);
                self.compensate(workspace_id, &attempt).await;
                Err(err)
            }
        }
    }

    async fn provision_inner(
        &self,
        workspace: &Workspace,
        attempt: &mut ProvisionAttempt,
    ) -> Result<()> {
        let resources = self.store.workspace_resources(&workspace.id).await?;

        // Short-lived, single-use join credential scoped to this workspace
        let credential = self
            .network
            .create_credential(&CredentialSpec {
                hostname: attempt.hostname.clone(),
                ttl_seconds: self.config.credential_ttl_seconds,
                ephemeral: true,
                preauthorized: true,
            })
            .await?;
        attempt.credential_id = Some(credential.id.clone());

        // Idempotent by construction: the check is against the persisted
        // external id, never provider-side naming, so a crashed run never
        // creates a second volume on retry.
        let external_volume_id = match resources.volume.external_volume_id {
            Some(id) => {
                debug!(workspace_id = %workspace.id, volume_id = %id, "Reusing existing volume");
                id
            }
            None => {
                let created = self
                    .compute
                    .create_volume(&VolumeSpec {
                        name: format!("{}-data", attempt.hostname),
                        size_gb: resources.volume.size_gb,
                        location: self.config.server_location.clone(),
                    })
                    .await?;
                self.compute
                    .wait_for_action(&created.action_id, self.config.action_timeout)
                    .await?;
                self.store
                    .set_volume_external_id(&workspace.id, &created.id)
                    .await?;
                self.emit_cost(ResourceType::Volume, &created.id, CostEventType::Create)
                    .await?;
                info!(workspace_id = %workspace.id, volume_id = %created.id, "Volume created");
                created.id
            }
        };

        // Device metadata needed to mount the volume inside the VM
        let volume = self
            .compute
            .get_volume(&external_volume_id)
            .await?
            .ok_or_else(|| {
                OrchestratorError::MissingResource(format!("volume {}", external_volume_id))
            })?;
        let volume_device = volume.device_path.ok_or_else(|| {
            OrchestratorError::MissingResource(format!(
                "device path for volume {}",
                external_volume_id
            ))
        })?;

        let bootstrap = BootstrapConfig {
            hostname: attempt.hostname.clone(),
            network_secret: credential.secret,
            volume_device,
            session_keys: None,
            capture_token: Some(generate_capture_token()),
            network_mode: workspace.network_mode,
        };

        let created = self
            .compute
            .create_server(&ServerSpec {
                name: attempt.hostname.clone(),
                server_class: resources.instance.server_class.clone(),
                image: self.config.server_image.clone(),
                location: self.config.server_location.clone(),
                user_data: bootstrap.render(),
                volume_ids: vec![external_volume_id],
            })
            .await?;
        attempt.server_id = Some(created.id.clone());

        self.compute
            .wait_for_action(&created.action_id, self.config.action_timeout)
            .await?;
        self.compute
            .wait_for_server_status(
                &created.id,
                ServerStatus::Running,
                self.config.server_running_timeout,
            )
            .await?;

        self.store
            .record_server_started(&workspace.id, &created.id, created.public_address.as_deref())
            .await?;
        self.emit_cost(ResourceType::Server, &created.id, CostEventType::Start)
            .await?;

        // With a public address, direct connectivity already works and
        // the overlay is best-effort. Without one, the overlay identity
        // is the only way in and its absence is a hard failure.
        let overlay_address = match &created.public_address {
            Some(_) => match self
                .network
                .wait_for_identity(&attempt.hostname, self.config.overlay_wait)
                .await
            {
                Ok(identity) => Some(identity.overlay_address),
                Err(err) => {
                    warn!(
                        workspace_id = %workspace.id,
                        "Overlay identity not found, continuing with direct address: {}",
                        err
                    );
                    None
                }
            },
            None => {
                let identity = self
                    .network
                    .wait_for_identity(&attempt.hostname, self.config.overlay_required_wait)
                    .await?;
                Some(identity.overlay_address)
            }
        };

        self.store
            .record_instance_running(
                &workspace.id,
                created.public_address.as_deref(),
                overlay_address.as_deref(),
            )
            .await?;
        self.store
            .update_workspace_status(&workspace.id, WorkspaceStatus::Ready)
            .await?;

        Ok(())
    }

    /// Best-effort rollback of everything this run created, then the
    /// terminal error state. Cleanup failures are logged, never allowed
    /// to mask the original error.
    async fn compensate(&self, workspace_id: &str, attempt: &ProvisionAttempt) {
        if let Some(server_id) = &attempt.server_id {
            match self.compute.delete_server(server_id).await {
                Ok(()) => info!(workspace_id, server_id = %server_id, "Rolled back server"),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    warn!(workspace_id, server_id = %server_id, "Cleanup of server failed: {}", err)
                }
            }
        }

        match self.network.get_identity_by_hostname(&attempt.hostname).await {
            Ok(Some(identity)) => {
                if let Err(err) = self.network.delete_identity(&identity.id).await {
                    warn!(workspace_id, "Cleanup of overlay identity failed: {}", err);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(workspace_id, "Overlay identity lookup failed: {}", err),
        }

        if let Some(credential_id) = &attempt.credential_id {
            if let Err(err) = self.network.delete_credential(credential_id).await {
                if !err.is_not_found() {
                    warn!(workspace_id, "Cleanup of join credential failed: {}", err);
                }
            }
        }

        if let Err(err) = self
            .store
            .update_instance_status(workspace_id, InstanceStatus::Stopped)
            .await
        {
            warn!(workspace_id, "Failed to mark instance stopped: {}", err);
        }
        if let Err(err) = self
            .store
            .update_workspace_status(workspace_id, WorkspaceStatus::Error)
            .await
        {
            warn!(workspace_id, "Failed to mark workspace errored: {}", err);
        }
    }

    pub(crate) async fn emit_cost(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        event_type: CostEventType,
    ) -> Result<()> {
        let rate = match resource_type {
            ResourceType::Volume => self.config.volume_rate,
            ResourceType::Server => self.config.server_rate,
        };

        self.store
            .record_cost_event(&CostEvent {
                resource_type,
                resource_id: resource_id.to_string(),
                event_type,
                rate,
                timestamp: Utc::now(),
            })
            .await?;

        Ok(())
    }
}

/// Opaque one-time token the in-VM agent presents when uploading newly
/// generated session credentials.
fn generate_capture_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}
