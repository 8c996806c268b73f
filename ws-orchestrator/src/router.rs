//! Routes dequeued jobs to the matching workflow. The match on
//! [`JobKind`] is exhaustive, so adding a job kind is a compile-time
//! change here rather than a runtime registry lookup.

use crate::destroy::DestroyRequest;
use crate::error::OrchestratorError;
use crate::Orchestrator;
use async_trait::async_trait;
use std::sync::Arc;
use ws_queue::{Job, JobKind};
use ws_worker::{JobError, JobHandler};

pub struct JobRouter {
    orchestrator: Arc<Orchestrator>,
}

impl JobRouter {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl JobHandler for JobRouter {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        let result = match job.kind {
            JobKind::Provision => {
                self.orchestrator
                    .provision(&job.workspace_id, &job.owner_id)
                    .await
            }
            JobKind::Destroy => self.orchestrator.destroy(&DestroyRequest::from(job)).await,
        };

        result.map_err(|err| classify(&err))
    }
}

/// Validation failures are terminal; everything else goes back through
/// the queue's retry policy. The queue cannot tell a fatal invariant
/// violation from a transient outage, so non-validation errors retry and
/// operators watch the dead-letter list.
fn classify(err: &OrchestratorError) -> JobError {
    if err.is_validation() {
        JobError::fatal(err)
    } else {
        JobError::retryable(err)
    }
}
