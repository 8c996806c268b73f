//! Full-stack lifecycle test: jobs enqueued on the durable queue are
//! picked up by the worker, routed to the orchestrator, and settle the
//! workspace state with mock providers behind the trait seams.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use ws_orchestrator::{JobRouter, Orchestrator, OrchestratorConfig};
use ws_provider::mock::{MockCompute, MockNetwork};
use ws_provider::{ComputeProvider, NetworkProvider};
use ws_queue::{Job, JobKind, JobQueue};
use ws_store::test_utils::create_test_db;
use ws_store::{NetworkMode, NewWorkspace, StoreError, WorkspaceStatus, WorkspaceStore};

struct Stack {
    store: WorkspaceStore,
    compute: Arc<MockCompute>,
    queue: JobQueue,
    worker: ws_worker::Worker,
}

async fn stack() -> Stack {
    let pool = create_test_db().await;
    let store = WorkspaceStore::new(pool.clone());
    let queue = JobQueue::new(pool);
    let compute = Arc::new(MockCompute::new());
    let network = Arc::new(MockNetwork::new());

    let config = OrchestratorConfig {
        action_timeout: Duration::from_millis(100),
        server_running_timeout: Duration::from_millis(100),
        overlay_wait: Duration::from_millis(50),
        overlay_required_wait: Duration::from_millis(50),
        ..OrchestratorConfig::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        compute.clone() as Arc<dyn ComputeProvider>,
        network as Arc<dyn NetworkProvider>,
        config,
    ));

    let worker = ws_worker::Worker::new(
        queue.clone(),
        Arc::new(JobRouter::new(orchestrator)),
        ws_worker::WorkerConfig::new(Duration::from_millis(10), 4, 3),
    );

    Stack {
        store,
        compute,
        queue,
        worker,
    }
}

async fn create_workspace(store: &WorkspaceStore) -> String {
    store
        .create_workspace(NewWorkspace {
            owner_id: "alice".to_string(),
            network_mode: NetworkMode::Direct,
            size_gb: 50,
            server_class: "cx22".to_string(),
        })
        .await
        .expect("Failed to create workspace")
        .id
}

/// Poll until the workspace reaches the wanted status or the deadline
/// passes.
async fn wait_for_status(store: &WorkspaceStore, workspace_id: &str, wanted: WorkspaceStatus) {
    for _ in 0..200 {
        if let Ok(workspace) = store.get_workspace(workspace_id).await {
            if workspace.status == wanted {
                return;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("workspace {} never reached {:?}", workspace_id, wanted);
}

async fn wait_for_deletion(store: &WorkspaceStore, workspace_id: &str) {
    for _ in 0..200 {
        match store.get_workspace(workspace_id).await {
            Err(StoreError::NotFound { .. }) => return,
            _ => sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("workspace {} records were never removed", workspace_id);
}

async fn wait_for_settled_queues(queue: &JobQueue) {
    for _ in 0..200 {
        let mut pending = 0;
        for kind in JobKind::all() {
            pending += queue.length(kind.queue_name()).await.unwrap();
        }
        if pending == 0 && queue.processing().await.unwrap().is_empty() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("queues never drained");
}

#[tokio::test]
async fn test_provision_job_flows_from_queue_to_ready_workspace() {
    let stack = stack().await;
    let workspace_id = create_workspace(&stack.store).await;

    stack
        .queue
        .enqueue("provision", &Job::provision(&workspace_id, "alice"))
        .await
        .expect("Enqueue failed");
    assert_eq!(stack.queue.length("provision").await.unwrap(), 1);

    stack.worker.start();
    wait_for_status(&stack.store, &workspace_id, WorkspaceStatus::Ready).await;
    wait_for_settled_queues(&stack.queue).await;
    stack.worker.stop(ws_worker::StopOptions::default()).await;

    assert_eq!(stack.compute.create_server_calls(), 1);
    assert!(stack.queue.dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_full_lifecycle_provision_suspend_resume_delete() {
    let stack = stack().await;
    let workspace_id = create_workspace(&stack.store).await;
    stack.worker.start();

    stack
        .queue
        .enqueue("provision", &Job::provision(&workspace_id, "alice"))
        .await
        .unwrap();
    wait_for_status(&stack.store, &workspace_id, WorkspaceStatus::Ready).await;

    stack
        .queue
        .enqueue("destroy", &Job::destroy(&workspace_id, "alice", false))
        .await
        .unwrap();
    wait_for_status(&stack.store, &workspace_id, WorkspaceStatus::Suspended).await;

    stack
        .queue
        .enqueue("provision", &Job::provision(&workspace_id, "alice"))
        .await
        .unwrap();
    wait_for_status(&stack.store, &workspace_id, WorkspaceStatus::Ready).await;

    stack
        .queue
        .enqueue("destroy", &Job::destroy(&workspace_id, "alice", true))
        .await
        .unwrap();
    wait_for_deletion(&stack.store, &workspace_id).await;

    wait_for_settled_queues(&stack.queue).await;
    stack.worker.stop(ws_worker::StopOptions::default()).await;

    // The data volume survived the suspend/resume and went away with the
    // final delete.
    assert_eq!(stack.compute.create_volume_calls(), 1);
    assert_eq!(stack.compute.deleted_volumes().len(), 1);
    assert_eq!(stack.compute.create_server_calls(), 2);
    assert_eq!(stack.compute.deleted_servers().len(), 2);
    assert!(stack.queue.dead_letters().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_validation_failure_dead_letters_without_retry() {
    let stack = stack().await;
    let workspace_id = create_workspace(&stack.store).await;
    stack.worker.start();

    // Wrong owner: a fatal validation error, not a transient fault
    stack
        .queue
        .enqueue("provision", &Job::provision(&workspace_id, "mallory"))
        .await
        .unwrap();

    wait_for_settled_queues(&stack.queue).await;
    stack.worker.stop(ws_worker::StopOptions::default()).await;

    let dead = stack.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 1);
    assert_eq!(stack.compute.create_server_calls(), 0);

    // The workspace was never touched
    let workspace = stack.store.get_workspace(&workspace_id).await.unwrap();
    assert_eq!(workspace.status, WorkspaceStatus::Pending);
}

#[tokio::test]
async fn test_transient_failure_retries_until_dead_letter() {
    let stack = stack().await;
    let workspace_id = create_workspace(&stack.store).await;

    // Every attempt fails at server creation with a 500
    stack.compute.fail_create_server();
    stack.worker.start();

    stack
        .queue
        .enqueue("provision", &Job::provision(&workspace_id, "alice"))
        .await
        .unwrap();

    wait_for_settled_queues(&stack.queue).await;
    stack.worker.stop(ws_worker::StopOptions::default()).await;

    let dead = stack.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 3);
    assert_eq!(stack.compute.create_server_calls(), 3);

    let workspace = stack.store.get_workspace(&workspace_id).await.unwrap();
    assert_eq!(workspace.status, WorkspaceStatus::Error);
}
