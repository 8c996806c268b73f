//! Poll-loop job dispatcher.
//!
//! A [`Worker`] owns the dispatch loop for one process: on a fixed
//! interval it sweeps every named queue, claims at most one job per queue
//! per sweep while under the concurrency bound, and runs each claimed job
//! as an independent tokio task. The loop never awaits handler
//! completion; a supervisor around each task settles the job back into
//! the queue (`complete`/`fail`) and releases the concurrency slot.
//! Cancellation is cooperative: `stop` flips the running flag and
//! optionally drains in-flight handlers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use ws_queue::{FailOptions, Job, JobKind, JobQueue};

/// Handler failure, classified for the retry policy. Validation errors
/// (not found, not owned, wrong state) are not retryable; provider and
/// timeout errors are.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct JobError {
    pub message: String,
    pub retryable: bool,
}

impl JobError {
    pub fn retryable(err: impl std::fmt::Display) -> Self {
        Self {
            message: err.to_string(),
            retryable: true,
        }
    }

    pub fn fatal(err: impl std::fmt::Display) -> Self {
        Self {
            message: err.to_string(),
            retryable: false,
        }
    }
}

/// Job consumer. The concrete implementation routes on [`JobKind`] with
/// an exhaustive match, so new kinds are compile-time-checked.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<(), JobError>;
}

pub type JobCallback = Arc<dyn Fn(&Job) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&Job, &JobError) + Send + Sync>;

#[derive(Clone)]
pub struct WorkerConfig {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    /// Invoked after a job settles successfully
    pub on_job_complete: Option<JobCallback>,
    /// Invoked after a handler error, before the job is requeued or
    /// dead-lettered
    pub on_error: Option<ErrorCallback>,
}

impl WorkerConfig {
    pub fn new(poll_interval: Duration, max_concurrent: usize, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_concurrent,
            max_attempts,
            on_job_complete: None,
            on_error: None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 4, 3)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StopOptions {
    /// Poll the in-flight count down to zero before returning
    pub wait_for_jobs: bool,
    pub timeout: Duration,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            wait_for_jobs: true,
            timeout: Duration::from_secs(30),
        }
    }
}

struct Inner {
    queue: JobQueue,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    running: AtomicBool,
    active: AtomicUsize,
}

/// The dispatcher. All state is constructor-injected so multiple workers
/// are testable in isolation; there are no process-wide globals.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<Inner>,
}

impl Worker {
    pub fn new(queue: JobQueue, handler: Arc<dyn JobHandler>, config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue,
                handler,
                config,
                running: AtomicBool::new(false),
                active: AtomicUsize::new(0),
            }),
        }
    }

    /// Spawn the dispatch loop. A second call while running logs and
    /// no-ops rather than spawning a competing loop.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("Worker already running; ignoring start");
            return;
        }

        info!(
            poll_interval_ms = self.inner.config.poll_interval.as_millis() as u64,
            max_concurrent = self.inner.config.max_concurrent,
            "Worker started"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_loop(inner));
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Number of handlers currently in flight
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Clear the running flag and, if requested, drain in-flight jobs.
    /// Handlers cannot be aborted mid-step; a warning is logged if any
    /// are still in flight when the timeout expires.
    pub async fn stop(&self, opts: StopOptions) {
        self.inner.running.store(false, Ordering::SeqCst);

        if !opts.wait_for_jobs {
            info!("Worker stopped");
            return;
        }

        let deadline = Instant::now() + opts.timeout;
        while self.active_count() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    in_flight = self.active_count(),
                    "Worker stop timed out with jobs still in flight"
                );
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }

        info!("Worker stopped");
    }
}

async fn run_loop(inner: Arc<Inner>) {
    while inner.running.load(Ordering::SeqCst) {
        for kind in JobKind::all() {
            if inner.active.load(Ordering::SeqCst) >= inner.config.max_concurrent {
                break;
            }

            match inner.queue.dequeue(kind.queue_name()).await {
                Ok(Some(job)) => {
                    inner.active.fetch_add(1, Ordering::SeqCst);
                    let inner = Arc::clone(&inner);
                    // Fire-and-forget relative to this loop; the spawned
                    // supervisor settles the job and releases the slot.
                    tokio::spawn(async move {
                        dispatch(inner, job).await;
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    error!(queue = kind.queue_name(), "Queue dequeue failed: {}", e);
                }
            }
        }

        sleep(inner.config.poll_interval).await;
    }
}

async fn dispatch(inner: Arc<Inner>, job: Job) {
    let result = inner.handler.handle(&job).await;

    match result {
        Ok(()) => {
            if let Err(e) = inner.queue.complete(&job).await {
                error!(job_id = %job.id, "Failed to complete job: {}", e);
            }
            if let Some(callback) = &inner.config.on_job_complete {
                callback(&job);
            }
        }
        Err(job_error) => {
            warn!(
                job_id = %job.id,
                attempts = job.attempts,
                retryable = job_error.retryable,
                "Job handler failed: {}",
                job_error
            );
            if let Some(callback) = &inner.config.on_error {
                callback(&job, &job_error);
            }

            let opts = FailOptions {
                requeue: job_error.retryable,
                max_attempts: inner.config.max_attempts,
            };
            if let Err(e) = inner.queue.fail(&job, opts).await {
                error!(job_id = %job.id, "Failed to fail job: {}", e);
            }
        }
    }

    inner.active.fetch_sub(1, Ordering::SeqCst);
}
