//! Durable, list-backed job queue with at-least-once delivery.
//!
//! Jobs live in named pending lists (one per job kind), a shared
//! processing list and a dead list. The only admission point is
//! [`JobQueue::dequeue`], which moves the pending head into processing and
//! increments the attempt counter in a single transaction, so delivery can
//! duplicate but never drop. All consumers are required to be idempotent.
//!
//! There is no automatic requeue if a worker process dies mid-handler:
//! such jobs stay on the processing list, which is exposed through
//! [`JobQueue::processing`] for operator inspection.

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, Result};
pub use job::{Job, JobKind};
pub use queue::{FailOptions, JobQueue};
