use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The user-facing unit: one dev environment backed by one VM and one
/// persistent volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub owner_id: String,
    pub status: WorkspaceStatus,
    pub network_mode: NetworkMode,

    #[serde(serialize_with = "serialize_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(serialize_with = "serialize_datetime")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Pending,
    Provisioning,
    Ready,
    Suspended,
    Deleting,
    Error,
}

/// Networking policy for a workspace. Direct mode exposes a public
/// address; private mode is reachable only through the overlay network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Direct,
    Private,
}

/// Persistent storage bound 1:1 to a workspace. `external_volume_id` is
/// the join key into the compute provider's inventory; it stays NULL
/// until the volume has actually been created there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub workspace_id: String,
    pub external_volume_id: Option<String>,
    pub size_gb: i64,
    pub status: VolumeStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    Pending,
    Available,
}

/// The VM bound 1:1 to a workspace. A workspace is only reachable when
/// the instance is running and at least one address is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub workspace_id: String,
    pub external_server_id: Option<String>,
    pub server_class: String,
    pub public_address: Option<String>,
    pub overlay_address: Option<String>,
    pub status: InstanceStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Request to create a workspace record along with its volume and
/// instance rows.
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkspace {
    pub owner_id: String,
    pub network_mode: NetworkMode,
    pub size_gb: i64,
    pub server_class: String,
}

/// A workspace loaded together with its volume and instance.
#[derive(Debug, Clone)]
pub struct WorkspaceResources {
    pub workspace: Workspace,
    pub volume: Volume,
    pub instance: Instance,
}

/// Discrete billing event emitted by the orchestrators. The shape is a
/// contract with the usage metering service downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEvent {
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub event_type: CostEventType,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Server,
    Volume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CostEventType {
    Create,
    Delete,
    Start,
    Stop,
}

// Serialize DateTime as RFC 3339 / ISO 8601 string
fn serialize_datetime<S>(dt: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}
