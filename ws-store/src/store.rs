use crate::error::{Result, StoreError};
use crate::models::{
    CostEvent, Instance, InstanceStatus, NewWorkspace, Volume, VolumeStatus, Workspace,
    WorkspaceResources, WorkspaceStatus,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct WorkspaceStore {
    pool: SqlitePool,
}

impl WorkspaceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a workspace record along with its volume and instance rows.
    /// Everything starts out `pending`; the provision orchestrator drives
    /// the rest of the lifecycle.
    pub async fn create_workspace(&self, req: NewWorkspace) -> Result<Workspace> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO workspaces (id, owner_id, status, network_mode, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&req.owner_id)
        .bind(WorkspaceStatus::Pending)
        .bind(req.network_mode)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO volumes (id, workspace_id, external_volume_id, size_gb, status)
             VALUES (?, ?, NULL, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id)
        .bind(req.size_gb)
        .bind(VolumeStatus::Pending)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO instances (id, workspace_id, server_class, status)
             VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&id)
        .bind(&req.server_class)
        .bind(InstanceStatus::Pending)
        .execute(&self.pool)
        .await?;

        self.get_workspace(&id).await
    }

    /// Get a single workspace by ID
    pub async fn get_workspace(&self, id: &str) -> Result<Workspace> {
        let row = sqlx::query_as::<_, WorkspaceRow>("SELECT * FROM workspaces WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        Ok(row.into())
    }

    pub async fn workspace_exists(&self, id: &str) -> Result<bool> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workspaces WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0 > 0)
    }

    /// Load a workspace together with its volume and instance rows
    pub async fn workspace_resources(&self, id: &str) -> Result<WorkspaceResources> {
        let workspace = self.get_workspace(id).await?;
        let volume = self.get_volume(id).await?;
        let instance = self.get_instance(id).await?;

        Ok(WorkspaceResources {
            workspace,
            volume,
            instance,
        })
    }

    pub async fn update_workspace_status(&self, id: &str, status: WorkspaceStatus) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query("UPDATE workspaces SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Remove the workspace and its volume/instance rows entirely.
    /// Used by the destroy orchestrator for full deletes.
    pub async fn delete_workspace_records(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM instances WHERE workspace_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM volumes WHERE workspace_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query("DELETE FROM workspaces WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    // --- Volumes ---

    pub async fn get_volume(&self, workspace_id: &str) -> Result<Volume> {
        let row = sqlx::query_as::<_, VolumeRow>("SELECT * FROM volumes WHERE workspace_id = ?")
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(workspace_id.to_string()))?;

        Ok(row.into())
    }

    /// Persist the provider-side volume id. This is what makes volume
    /// creation idempotent: the provision step checks the persisted id,
    /// never provider-side naming.
    pub async fn set_volume_external_id(
        &self,
        workspace_id: &str,
        external_volume_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE volumes SET external_volume_id = ?, status = ? WHERE workspace_id = ?",
        )
        .bind(external_volume_id)
        .bind(VolumeStatus::Available)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn volume_external_id_exists(&self, external_volume_id: &str) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM volumes WHERE external_volume_id = ?")
                .bind(external_volume_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0 > 0)
    }

    // --- Instances ---

    pub async fn get_instance(&self, workspace_id: &str) -> Result<Instance> {
        let row =
            sqlx::query_as::<_, InstanceRow>("SELECT * FROM instances WHERE workspace_id = ?")
                .bind(workspace_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| StoreError::NotFound(workspace_id.to_string()))?;

        Ok(row.into())
    }

    pub async fn update_instance_status(
        &self,
        workspace_id: &str,
        status: InstanceStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE instances SET status = ? WHERE workspace_id = ?")
            .bind(status)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Record the external server after creation: id, public address (if
    /// any) and the start timestamp.
    pub async fn record_server_started(
        &self,
        workspace_id: &str,
        external_server_id: &str,
        public_address: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            "UPDATE instances
             SET external_server_id = ?, public_address = ?, started_at = ?
             WHERE workspace_id = ?",
        )
        .bind(external_server_id)
        .bind(public_address)
        .bind(now)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Final provisioning state: running with whichever addresses resolved
    pub async fn record_instance_running(
        &self,
        workspace_id: &str,
        public_address: Option<&str>,
        overlay_address: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE instances
             SET status = ?, public_address = ?, overlay_address = ?, stopped_at = NULL
             WHERE workspace_id = ?",
        )
        .bind(InstanceStatus::Running)
        .bind(public_address)
        .bind(overlay_address)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terminal stop state: the external server is gone, so its id and
    /// addresses are cleared along with the status change.
    pub async fn record_instance_stopped(&self, workspace_id: &str) -> Result<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            "UPDATE instances
             SET status = ?, external_server_id = NULL, public_address = NULL,
                 overlay_address = NULL, stopped_at = ?
             WHERE workspace_id = ?",
        )
        .bind(InstanceStatus::Stopped)
        .bind(now)
        .bind(workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn server_external_id_exists(&self, external_server_id: &str) -> Result<bool> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM instances WHERE external_server_id = ?")
                .bind(external_server_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0 > 0)
    }

    // --- Cost events ---

    pub async fn record_cost_event(&self, event: &CostEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO cost_events (id, resource_type, resource_id, event_type, rate, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event.resource_type)
        .bind(&event.resource_id)
        .bind(event.event_type)
        .bind(event.rate)
        .bind(event.timestamp.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn cost_events_for(&self, resource_id: &str) -> Result<Vec<CostEvent>> {
        let rows = sqlx::query_as::<_, CostEventRow>(
            "SELECT * FROM cost_events WHERE resource_id = ? ORDER BY timestamp, rowid",
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into()).collect())
    }
}

// Internal row types for sqlx
#[derive(sqlx::FromRow)]
struct WorkspaceRow {
    id: String,
    owner_id: String,
    status: WorkspaceStatus,
    network_mode: crate::models::NetworkMode,
    created_at: i64,
    updated_at: i64,
}

#[derive(sqlx::FromRow)]
struct VolumeRow {
    id: String,
    workspace_id: String,
    external_volume_id: Option<String>,
    size_gb: i64,
    status: VolumeStatus,
}

#[derive(sqlx::FromRow)]
struct InstanceRow {
    id: String,
    workspace_id: String,
    external_server_id: Option<String>,
    server_class: String,
    public_address: Option<String>,
    overlay_address: Option<String>,
    status: InstanceStatus,
    started_at: Option<i64>,
    stopped_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct CostEventRow {
    #[allow(dead_code)]
    id: String,
    resource_type: crate::models::ResourceType,
    resource_id: String,
    event_type: crate::models::CostEventType,
    rate: f64,
    timestamp: i64,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            status: row.status,
            network_mode: row.network_mode,
            created_at: timestamp_or_epoch(row.created_at),
            updated_at: timestamp_or_epoch(row.updated_at),
        }
    }
}

impl From<VolumeRow> for Volume {
    fn from(row: VolumeRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            external_volume_id: row.external_volume_id,
            size_gb: row.size_gb,
            status: row.status,
        }
    }
}

impl From<InstanceRow> for Instance {
    fn from(row: InstanceRow) -> Self {
        Self {
            id: row.id,
            workspace_id: row.workspace_id,
            external_server_id: row.external_server_id,
            server_class: row.server_class,
            public_address: row.public_address,
            overlay_address: row.overlay_address,
            status: row.status,
            started_at: row.started_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            stopped_at: row.stopped_at.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

impl From<CostEventRow> for CostEvent {
    fn from(row: CostEventRow) -> Self {
        Self {
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            event_type: row.event_type,
            rate: row.rate,
            timestamp: timestamp_or_epoch(row.timestamp),
        }
    }
}

fn timestamp_or_epoch(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
