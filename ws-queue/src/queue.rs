use crate::error::Result;
use crate::job::Job;
use sqlx::SqlitePool;
use tracing::{debug, warn};

const LIST_PENDING: &str = "pending";
const LIST_PROCESSING: &str = "processing";
const LIST_DEAD: &str = "dead";

/// Options for [`JobQueue::fail`]
#[derive(Debug, Clone, Copy)]
pub struct FailOptions {
    /// Re-append to the pending tail when attempts remain
    pub requeue: bool,
    /// Attempt cap; a job at or past this is dead-lettered
    pub max_attempts: u32,
}

/// List-backed queue over the shared SQLite pool.
///
/// FIFO per queue (rowid order within the pending list); requeued jobs are
/// re-inserted at the tail, so a failing job loses its place in line.
#[derive(Clone)]
pub struct JobQueue {
    pool: SqlitePool,
}

impl JobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a job to the tail of the named pending list
    pub async fn enqueue(&self, queue: &str, job: &Job) -> Result<Job> {
        let mut job = job.clone();
        job.attempts = 0;

        sqlx::query(
            "INSERT INTO queue_jobs (id, queue, list, body, attempts, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&job.id)
        .bind(queue)
        .bind(LIST_PENDING)
        .bind(serde_json::to_string(&job)?)
        .bind(job.created_at.timestamp())
        .execute(&self.pool)
        .await?;

        debug!(job_id = %job.id, queue, "Enqueued job");
        Ok(job)
    }

    /// Atomically move the pending head to the processing list and
    /// increment its attempt counter. This is the sole admission point;
    /// the move-and-increment happens in one transaction so delivery is
    /// at-least-once, never zero-time.
    pub async fn dequeue(&self, queue: &str) -> Result<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, String, i64)> = sqlx::query_as(
            "SELECT rowid, body, attempts FROM queue_jobs
             WHERE queue = ? AND list = ? ORDER BY rowid LIMIT 1",
        )
        .bind(queue)
        .bind(LIST_PENDING)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((rowid, body, attempts)) = row else {
            return Ok(None);
        };

        let attempts = attempts + 1;
        sqlx::query("UPDATE queue_jobs SET list = ?, attempts = ? WHERE rowid = ?")
            .bind(LIST_PROCESSING)
            .bind(attempts)
            .bind(rowid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let mut job: Job = serde_json::from_str(&body)?;
        job.attempts = attempts as u32;

        debug!(job_id = %job.id, queue, attempts, "Dequeued job");
        Ok(Some(job))
    }

    /// Remove a finished job from the processing list
    pub async fn complete(&self, job: &Job) -> Result<()> {
        sqlx::query("DELETE FROM queue_jobs WHERE id = ? AND list = ?")
            .bind(&job.id)
            .bind(LIST_PROCESSING)
            .execute(&self.pool)
            .await?;

        debug!(job_id = %job.id, "Completed job");
        Ok(())
    }

    /// Remove a failed job from the processing list and either re-append
    /// it to the pending tail (when `requeue` and attempts remain) or
    /// move it to the dead list for operator inspection.
    pub async fn fail(&self, job: &Job, opts: FailOptions) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let queue: Option<(String,)> =
            sqlx::query_as("SELECT queue FROM queue_jobs WHERE id = ? AND list = ?")
                .bind(&job.id)
                .bind(LIST_PROCESSING)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((queue,)) = queue else {
            // Already completed or failed by another consumer; at-least-once
            // delivery makes this a benign race.
            tx.commit().await?;
            return Ok(());
        };

        sqlx::query("DELETE FROM queue_jobs WHERE id = ?")
            .bind(&job.id)
            .execute(&mut *tx)
            .await?;

        if opts.requeue && job.attempts < opts.max_attempts {
            sqlx::query(
                "INSERT INTO queue_jobs (id, queue, list, body, attempts, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&job.id)
            .bind(&queue)
            .bind(LIST_PENDING)
            .bind(serde_json::to_string(job)?)
            .bind(job.attempts as i64)
            .bind(job.created_at.timestamp())
            .execute(&mut *tx)
            .await?;

            debug!(job_id = %job.id, queue, attempts = job.attempts, "Requeued job");
        } else {
            sqlx::query(
                "INSERT INTO queue_jobs (id, queue, list, body, attempts, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&job.id)
            .bind(&queue)
            .bind(LIST_DEAD)
            .bind(serde_json::to_string(job)?)
            .bind(job.attempts as i64)
            .bind(job.created_at.timestamp())
            .execute(&mut *tx)
            .await?;

            warn!(job_id = %job.id, queue, attempts = job.attempts, "Dead-lettered job");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Number of jobs waiting on the named pending list
    pub async fn length(&self, queue: &str) -> Result<u64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_jobs WHERE queue = ? AND list = ?")
                .bind(queue)
                .bind(LIST_PENDING)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0 as u64)
    }

    /// Snapshot of the named pending list, head first
    pub async fn list(&self, queue: &str) -> Result<Vec<Job>> {
        self.list_jobs(Some(queue), LIST_PENDING).await
    }

    /// Jobs currently claimed by a consumer
    pub async fn processing(&self) -> Result<Vec<Job>> {
        self.list_jobs(None, LIST_PROCESSING).await
    }

    /// Jobs that exhausted their attempts or were non-retryable
    pub async fn dead_letters(&self) -> Result<Vec<Job>> {
        self.list_jobs(None, LIST_DEAD).await
    }

    async fn list_jobs(&self, queue: Option<&str>, list: &str) -> Result<Vec<Job>> {
        let rows: Vec<(String, i64)> = match queue {
            Some(queue) => {
                sqlx::query_as(
                    "SELECT body, attempts FROM queue_jobs
                     WHERE queue = ? AND list = ? ORDER BY rowid",
                )
                .bind(queue)
                .bind(list)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT body, attempts FROM queue_jobs WHERE list = ? ORDER BY rowid",
                )
                .bind(list)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut jobs = Vec::with_capacity(rows.len());
        for (body, attempts) in rows {
            let mut job: Job = serde_json::from_str(&body)?;
            job.attempts = attempts as u32;
            jobs.push(job);
        }

        Ok(jobs)
    }
}
