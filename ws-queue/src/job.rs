use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of job kinds. Adding a kind is a compile-time-checked
/// change: the router matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Provision,
    Destroy,
}

impl JobKind {
    /// Name of the pending list this kind is enqueued to
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::Provision => "provision",
            Self::Destroy => "destroy",
        }
    }

    /// All kinds, in the order the dispatcher sweeps them
    pub fn all() -> [JobKind; 2] {
        [Self::Provision, Self::Destroy]
    }
}

/// Envelope for queued work. The serialized form is the wire/persisted
/// JSON contract shared with the API layer:
/// `{id, type, workspaceId, ownerId, attempts, createdAt, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: JobKind,

    pub workspace_id: String,
    pub owner_id: String,

    /// Incremented by the queue on every dequeue
    #[serde(default)]
    pub attempts: u32,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_server_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_volume_id: Option<String>,

    #[serde(default)]
    pub delete_after_destroy: bool,
}

impl Job {
    pub fn provision(workspace_id: &str, owner_id: &str) -> Self {
        Self::new(JobKind::Provision, workspace_id, owner_id)
    }

    pub fn destroy(workspace_id: &str, owner_id: &str, delete_after_destroy: bool) -> Self {
        let mut job = Self::new(JobKind::Destroy, workspace_id, owner_id);
        job.delete_after_destroy = delete_after_destroy;
        job
    }

    fn new(kind: JobKind, workspace_id: &str, owner_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            workspace_id: workspace_id.to_string(),
            owner_id: owner_id.to_string(),
            attempts: 0,
            created_at: Utc::now(),
            external_server_id: None,
            external_volume_id: None,
            delete_after_destroy: false,
        }
    }
}
