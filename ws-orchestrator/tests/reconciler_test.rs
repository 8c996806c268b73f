//! Integration tests for the orphan reconciler: age guard, store and
//! naming-convention matches, and explicit cleanup.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use ws_orchestrator::Reconciler;
use ws_provider::mock::{MockCompute, MockNetwork};
use ws_provider::{ComputeProvider, ComputeServer, ComputeVolume, NetworkProvider, ServerStatus};
use ws_store::test_utils::create_test_db;
use ws_store::{NetworkMode, NewWorkspace, WorkspaceStore};

const MIN_AGE: Duration = Duration::from_secs(24 * 60 * 60);

struct Fixture {
    store: WorkspaceStore,
    compute: Arc<MockCompute>,
    network: Arc<MockNetwork>,
    reconciler: Reconciler,
}

async fn fixture() -> Fixture {
    let pool = create_test_db().await;
    let store = WorkspaceStore::new(pool);
    let compute = Arc::new(MockCompute::new());
    let network = Arc::new(MockNetwork::new());
    let reconciler = Reconciler::new(
        store.clone(),
        compute.clone() as Arc<dyn ComputeProvider>,
        network.clone() as Arc<dyn NetworkProvider>,
        MIN_AGE,
    );

    Fixture {
        store,
        compute,
        network,
        reconciler,
    }
}

fn old_volume(id: &str, name: &str) -> ComputeVolume {
    ComputeVolume {
        id: id.to_string(),
        name: name.to_string(),
        size_gb: 50,
        device_path: None,
        server_id: None,
        created_at: Utc::now() - ChronoDuration::hours(48),
    }
}

fn old_server(id: &str, name: &str) -> ComputeServer {
    ComputeServer {
        id: id.to_string(),
        name: name.to_string(),
        status: ServerStatus::Running,
        public_address: None,
        created_at: Utc::now() - ChronoDuration::hours(48),
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

#[tokio::test]
async fn test_unknown_old_resources_are_reported() {
    let fx = fixture().await;
    fx.compute.insert_volume(old_volume("vol-stray", "backup-data"));
    fx.compute.insert_server(old_server("srv-stray", "forgotten-box"));

    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert_eq!(report.total(), 2);
    assert_eq!(report.volumes[0].external_id, "vol-stray");
    assert_eq!(report.servers[0].external_id, "srv-stray");
}

#[tokio::test]
async fn test_young_resources_are_never_reported() {
    let fx = fixture().await;

    // Created just now, likely mid-provision; the id may simply not be
    // persisted yet.
    fx.compute.insert_volume(ComputeVolume {
        created_at: Utc::now() - ChronoDuration::minutes(1),
        ..old_volume("vol-fresh", "just-created")
    });
    fx.compute.insert_server(ComputeServer {
        created_at: Utc::now() - ChronoDuration::minutes(1),
        ..old_server("srv-fresh", "just-created")
    });

    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_resources_known_to_the_store_are_skipped() {
    let fx = fixture().await;
    let workspace_id = create_workspace(&fx.store).await;

    fx.store
        .set_volume_external_id(&workspace_id, "vol-tracked")
        .await
        .unwrap();
    fx.store
        .record_server_started(&workspace_id, "srv-tracked", Some("203.0.113.7"))
        .await
        .unwrap();

    fx.compute
        .insert_volume(old_volume("vol-tracked", "some-old-name"));
    fx.compute
        .insert_server(old_server("srv-tracked", "some-old-name"));

    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_name_prefix_fallback_protects_live_workspaces() {
    let fx = fixture().await;
    let live_id = create_workspace(&fx.store).await;

    // External ids unknown to the store, but the names resolve to a
    // workspace that still exists.
    fx.compute.insert_volume(old_volume(
        "vol-unrecorded",
        &format!("ws-{}-data", live_id),
    ));
    fx.compute
        .insert_server(old_server("srv-unrecorded", &format!("ws-{}", live_id)));

    // Same names pointing at a workspace that no longer exists
    let dead_id = "5f0a9c1e-2d3b-4c4d-8e6f-1a2b3c4d5e6f";
    fx.compute
        .insert_volume(old_volume("vol-dead", &format!("ws-{}-data", dead_id)));
    fx.compute
        .insert_server(old_server("srv-dead", &format!("ws-{}", dead_id)));

    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert_eq!(report.volumes.len(), 1);
    assert_eq!(report.volumes[0].external_id, "vol-dead");
    assert_eq!(report.servers.len(), 1);
    assert_eq!(report.servers[0].external_id, "srv-dead");
}

#[tokio::test]
async fn test_stale_overlay_identities_are_reported() {
    let fx = fixture().await;
    let live_id = create_workspace(&fx.store).await;
    let dead_id = "5f0a9c1e-2d3b-4c4d-8e6f-1a2b3c4d5e6f";

    fx.network
        .register_identity(&format!("ws-{}", live_id), "100.64.0.10");
    fx.network
        .register_identity(&format!("ws-{}", dead_id), "100.64.0.11");
    // Not workspace-managed at all; never touched
    fx.network.register_identity("ops-bastion", "100.64.0.12");

    // register_identity stamps created_at with now, so nothing clears
    // the age guard yet.
    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert!(report.identities.is_empty());

    let reconciler = Reconciler::new(
        fx.store.clone(),
        fx.compute.clone() as Arc<dyn ComputeProvider>,
        fx.network.clone() as Arc<dyn NetworkProvider>,
        Duration::ZERO,
    );
    let report = reconciler.scan().await.expect("Scan failed");
    assert_eq!(report.identities.len(), 1);
    assert_eq!(report.identities[0].name, format!("ws-{}", dead_id));
}

#[tokio::test]
async fn test_dry_run_deletes_nothing() {
    let fx = fixture().await;
    fx.compute.insert_volume(old_volume("vol-stray", "stray"));

    let report = fx.reconciler.run(false).await.expect("Run failed");
    assert_eq!(report.total(), 1);
    assert!(fx.compute.deleted_volumes().is_empty());

    // The resource is still reported on the next pass
    let report = fx.reconciler.run(false).await.expect("Run failed");
    assert_eq!(report.total(), 1);
}

#[tokio::test]
async fn test_explicit_cleanup_deletes_reported_resources() {
    let fx = fixture().await;
    fx.compute.insert_volume(old_volume("vol-stray", "stray"));
    fx.compute.insert_server(old_server("srv-stray", "stray"));

    let report = fx.reconciler.run(true).await.expect("Run failed");
    assert_eq!(report.total(), 2);
    assert_eq!(fx.compute.deleted_volumes(), vec!["vol-stray".to_string()]);
    assert_eq!(fx.compute.deleted_servers(), vec!["srv-stray".to_string()]);

    let report = fx.reconciler.scan().await.expect("Scan failed");
    assert!(report.is_empty());
}

#[tokio::test]
async fn test_one_failed_deletion_does_not_abort_the_batch() {
    let fx = fixture().await;
    fx.compute.insert_volume(old_volume("vol-a", "stray-a"));
    fx.compute.insert_volume(old_volume("vol-b", "stray-b"));
    fx.compute.fail_delete("vol-a");

    let report = fx.reconciler.scan().await.expect("Scan failed");
    let outcome = fx.reconciler.cleanup(&report).await;

    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(fx.compute.deleted_volumes(), vec!["vol-b".to_string()]);
}
