//! Workspace lifecycle orchestration.
//!
//! Drives a workspace through the multi-step, multi-provider provision
//! and destroy workflows with compensating actions on partial failure,
//! and runs the out-of-band orphan sweep that catches billable resources
//! the record store has lost track of. There are no distributed
//! transactions here: correctness comes from at-least-once job delivery
//! plus idempotent, id-keyed steps.

use std::sync::Arc;
use std::time::Duration;

use ws_provider::{ComputeProvider, NetworkProvider};
use ws_store::WorkspaceStore;

pub mod bootstrap;
pub mod destroy;
pub mod error;
pub mod provision;
pub mod reconciler;
pub mod router;

pub use bootstrap::{BootstrapConfig, SessionKeys};
pub use destroy::DestroyRequest;
pub use error::{OrchestratorError, Result};
pub use reconciler::{CleanupOutcome, OrphanReport, OrphanResource, Reconciler};
pub use router::JobRouter;

/// Tunables for the provision/destroy workflows. Rates feed the cost
/// events; timeouts bound the provider wait loops.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// OS image for new servers. Empty is an invariant violation caught
    /// before any external resource is created.
    pub server_image: String,
    pub server_location: String,
    /// Lifetime of the single-use overlay join credential
    pub credential_ttl_seconds: u64,
    /// Budget for provider-side create actions
    pub action_timeout: Duration,
    /// Budget for the VM to reach the running status
    pub server_running_timeout: Duration,
    /// Short best-effort overlay wait when a public address exists
    pub overlay_wait: Duration,
    /// Longer mandatory overlay wait for private-mode workspaces
    pub overlay_required_wait: Duration,
    /// Hourly rates recorded on cost events
    pub volume_rate: f64,
    pub server_rate: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            server_image: "ubuntu-24.04".to_string(),
            server_location: "fsn1".to_string(),
            credential_ttl_seconds: 600,
            action_timeout: Duration::from_secs(120),
            server_running_timeout: Duration::from_secs(300),
            overlay_wait: Duration::from_secs(30),
            overlay_required_wait: Duration::from_secs(180),
            volume_rate: 0.0048,
            server_rate: 0.0082,
        }
    }
}

/// Shared context for both workflows: the record store, the two provider
/// clients and the config.
#[derive(Clone)]
pub struct Orchestrator {
    store: WorkspaceStore,
    compute: Arc<dyn ComputeProvider>,
    network: Arc<dyn NetworkProvider>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        store: WorkspaceStore,
        compute: Arc<dyn ComputeProvider>,
        network: Arc<dyn NetworkProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            compute,
            network,
            config,
        }
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }
}

/// Naming convention for external resources: every provider-side object
/// belonging to a workspace carries the `ws-<workspace id>` prefix. The
/// reconciler relies on this as its fallback match.
pub fn workspace_hostname(workspace_id: &str) -> String {
    format!("ws-{}", workspace_id)
}

/// Inverse of [`workspace_hostname`]: extract the workspace id from a
/// resource name, if it follows the convention.
pub fn workspace_id_from_name(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("ws-")?;
    let id = rest.get(..36)?;
    uuid::Uuid::parse_str(id).ok()?;
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_id_round_trips_through_resource_names() {
        let id = "0d4340f2-5b42-4f1c-9a2e-7f3b8c1d6e5a";
        let hostname = workspace_hostname(id);
        assert_eq!(workspace_id_from_name(&hostname), Some(id));
        assert_eq!(
            workspace_id_from_name(&format!("{}-data", hostname)),
            Some(id)
        );
    }

    #[test]
    fn unrelated_names_do_not_match() {
        assert_eq!(workspace_id_from_name("backup-volume"), None);
        assert_eq!(workspace_id_from_name("ws-not-a-uuid"), None);
        assert_eq!(workspace_id_from_name("ws-"), None);
    }
}
