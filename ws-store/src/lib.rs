//! Relational record store for workspace orchestration.
//!
//! Holds the durable view of every workspace and its two external
//! resources (one volume, one instance), plus the cost-event log the
//! orchestrators emit to. Consumed by the orchestrators, the worker and
//! the reconciler; never mutated by the HTTP layer directly.

pub mod db;
pub mod error;
pub mod models;
pub mod store;
pub mod test_utils;

pub use error::{Result, StoreError};
pub use models::{
    CostEvent, CostEventType, Instance, InstanceStatus, NetworkMode, NewWorkspace, ResourceType,
    Volume, VolumeStatus, Workspace, WorkspaceResources, WorkspaceStatus,
};
pub use store::WorkspaceStore;
