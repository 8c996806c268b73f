//! Provider client abstraction for the workspace orchestration core.
//!
//! Two independent external services own the billable resources: the
//! compute provider (servers, volumes, actions) and the overlay-network
//! provider (credentials, identities). This crate defines the traits the
//! orchestrators consume, typed errors, `reqwest`-backed implementations
//! and — behind the `test-helpers` feature — in-memory mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod compute;
pub mod error;
pub mod network;

// When the `test-helpers` feature is enabled, include the mock providers.
#[cfg(feature = "test-helpers")]
pub mod mock;

pub use compute::HttpCompute;
pub use error::{ProviderError, Result};
pub use network::HttpNetwork;

/// External server lifecycle states as reported by the compute provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Initializing,
    Starting,
    Running,
    Stopping,
    Off,
    Deleting,
}

/// Request to create an external volume
#[derive(Debug, Clone, Serialize)]
pub struct VolumeSpec {
    pub name: String,
    pub size_gb: i64,
    pub location: String,
}

/// Handle returned by volume creation; `action_id` tracks the async
/// provider-side operation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedVolume {
    pub id: String,
    pub action_id: String,
}

/// Provider-side view of a volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeVolume {
    pub id: String,
    pub name: String,
    pub size_gb: i64,
    /// Linux device path for mounting inside the VM, once attached
    pub device_path: Option<String>,
    pub server_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request to create an external server
#[derive(Debug, Clone, Serialize)]
pub struct ServerSpec {
    pub name: String,
    pub server_class: String,
    pub image: String,
    pub location: String,
    /// Rendered cloud-init document
    pub user_data: String,
    /// Volumes to attach at boot
    pub volume_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedServer {
    pub id: String,
    pub action_id: String,
    pub public_address: Option<String>,
}

/// Provider-side view of a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeServer {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    pub public_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Compute/volume API consumed by the orchestrators and the reconciler.
/// Get operations return `None` for unknown ids; delete operations
/// surface a 404 API error, which callers treat as already-deleted.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<CreatedVolume>;
    async fn get_volume(&self, id: &str) -> Result<Option<ComputeVolume>>;
    async fn delete_volume(&self, id: &str) -> Result<()>;
    async fn list_volumes(&self) -> Result<Vec<ComputeVolume>>;

    async fn create_server(&self, spec: &ServerSpec) -> Result<CreatedServer>;
    async fn get_server(&self, id: &str) -> Result<Option<ComputeServer>>;
    async fn delete_server(&self, id: &str) -> Result<()>;
    async fn list_servers(&self) -> Result<Vec<ComputeServer>>;

    /// Block until the provider-side action finishes, or time out
    async fn wait_for_action(&self, action_id: &str, timeout: Duration) -> Result<()>;

    /// Block until the server reports the given status, or time out
    async fn wait_for_server_status(
        &self,
        id: &str,
        status: ServerStatus,
        timeout: Duration,
    ) -> Result<()>;
}

/// Request for a short-lived, single-use join credential scoped to one
/// workspace hostname.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialSpec {
    pub hostname: String,
    pub ttl_seconds: u64,
    /// Single-use: consumed on first join
    pub ephemeral: bool,
    /// Pre-authorized: the joining node needs no manual approval
    pub preauthorized: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkCredential {
    pub id: String,
    pub secret: String,
}

/// A node registered on the overlay network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub id: String,
    pub hostname: String,
    pub overlay_address: String,
    pub created_at: DateTime<Utc>,
}

/// Overlay-network API consumed by the orchestrators and the reconciler
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn create_credential(&self, spec: &CredentialSpec) -> Result<NetworkCredential>;
    async fn delete_credential(&self, id: &str) -> Result<()>;

    async fn list_identities(&self) -> Result<Vec<NetworkIdentity>>;
    async fn get_identity_by_hostname(&self, hostname: &str) -> Result<Option<NetworkIdentity>>;
    async fn delete_identity(&self, id: &str) -> Result<()>;

    /// Poll until a node with the hostname appears, or time out
    async fn wait_for_identity(
        &self,
        hostname: &str,
        timeout: Duration,
    ) -> Result<NetworkIdentity>;
}
