//! Integration tests for ws-queue
//!
//! Exercises the at-least-once contract: atomic dequeue with attempt
//! counting, FIFO ordering, requeue-to-tail under the attempt cap and
//! dead-letter observability.

use ws_queue::{FailOptions, Job, JobQueue};
use ws_store::test_utils::create_test_db;

#[tokio::test]
async fn test_enqueue_dequeue_increments_attempts() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    let job = queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .expect("Failed to enqueue");
    assert_eq!(job.attempts, 0);
    assert_eq!(queue.length("provision").await.unwrap(), 1);

    let dequeued = queue
        .dequeue("provision")
        .await
        .expect("Failed to dequeue")
        .expect("Expected a job");
    assert_eq!(dequeued.id, job.id);
    assert_eq!(dequeued.attempts, 1);

    // Moved to processing, not dropped
    assert_eq!(queue.length("provision").await.unwrap(), 0);
    let processing = queue.processing().await.unwrap();
    assert_eq!(processing.len(), 1);
    assert_eq!(processing[0].id, job.id);
}

#[tokio::test]
async fn test_dequeue_empty_returns_none() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    let result = queue.dequeue("provision").await.expect("Failed to dequeue");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_fifo_order_within_queue() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    let first = queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .unwrap();
    let second = queue
        .enqueue("provision", &Job::provision("ws-2", "alice"))
        .await
        .unwrap();

    let listed = queue.list("provision").await.unwrap();
    assert_eq!(listed[0].id, first.id);
    assert_eq!(listed[1].id, second.id);

    assert_eq!(queue.dequeue("provision").await.unwrap().unwrap().id, first.id);
    assert_eq!(queue.dequeue("provision").await.unwrap().unwrap().id, second.id);
}

#[tokio::test]
async fn test_complete_removes_from_processing() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    queue
        .enqueue("destroy", &Job::destroy("ws-1", "alice", false))
        .await
        .unwrap();
    let job = queue.dequeue("destroy").await.unwrap().unwrap();

    queue.complete(&job).await.expect("Failed to complete");

    assert!(queue.processing().await.unwrap().is_empty());
    assert_eq!(queue.length("destroy").await.unwrap(), 0);
}

#[tokio::test]
async fn test_fail_requeues_to_tail_under_attempt_cap() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    let failing = queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .unwrap();
    queue
        .enqueue("provision", &Job::provision("ws-2", "alice"))
        .await
        .unwrap();

    // attempts becomes 1, still below the cap of 3
    let job = queue.dequeue("provision").await.unwrap().unwrap();
    assert_eq!(job.id, failing.id);

    queue
        .fail(
            &job,
            FailOptions {
                requeue: true,
                max_attempts: 3,
            },
        )
        .await
        .expect("Failed to fail job");

    // Requeued at the tail: the other job is now the head
    let listed = queue.list("provision").await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].id, failing.id);
    assert!(queue.dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_fail_at_max_attempts_dead_letters() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .unwrap();

    let opts = FailOptions {
        requeue: true,
        max_attempts: 3,
    };

    // attempts 1 and 2 requeue; attempt 3 hits the cap
    for expected_attempts in 1..=3 {
        let job = queue.dequeue("provision").await.unwrap().unwrap();
        assert_eq!(job.attempts, expected_attempts);
        queue.fail(&job, opts).await.unwrap();
    }

    assert_eq!(queue.length("provision").await.unwrap(), 0);
    assert!(queue.processing().await.unwrap().is_empty());

    let dead = queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
}

#[tokio::test]
async fn test_fail_without_requeue_dead_letters_immediately() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .unwrap();
    let job = queue.dequeue("provision").await.unwrap().unwrap();

    queue
        .fail(
            &job,
            FailOptions {
                requeue: false,
                max_attempts: 3,
            },
        )
        .await
        .unwrap();

    assert_eq!(queue.length("provision").await.unwrap(), 0);
    assert_eq!(queue.dead_letters().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_queues_are_independent() {
    let pool = create_test_db().await;
    let queue = JobQueue::new(pool);

    queue
        .enqueue("provision", &Job::provision("ws-1", "alice"))
        .await
        .unwrap();
    queue
        .enqueue("destroy", &Job::destroy("ws-2", "bob", true))
        .await
        .unwrap();

    assert_eq!(queue.length("provision").await.unwrap(), 1);
    assert_eq!(queue.length("destroy").await.unwrap(), 1);

    let job = queue.dequeue("destroy").await.unwrap().unwrap();
    assert_eq!(job.workspace_id, "ws-2");
    assert_eq!(queue.length("provision").await.unwrap(), 1);
}
