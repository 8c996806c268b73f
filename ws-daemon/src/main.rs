mod config;

use anyhow::Result;
use config::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use ws_orchestrator::{JobRouter, Orchestrator, Reconciler};
use ws_provider::{ComputeProvider, HttpCompute, HttpNetwork, NetworkProvider};
use ws_queue::JobQueue;
use ws_store::db::{backup_database, create_pool, run_migrations};
use ws_store::WorkspaceStore;
use ws_worker::{StopOptions, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ws_daemon=debug,ws_orchestrator=debug,ws_worker=debug,ws_queue=debug".into()
            }),
        )
        .init();

    info!("Starting workspace daemon...");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: db_path={}, poll_interval={}s, max_concurrent={}",
        config.db_path.display(),
        config.poll_interval_secs,
        config.max_concurrent
    );

    // Backup before migrations
    if config.db_path.exists() {
        let backup_path = backup_database(&config.db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    let pool = create_pool(&config.db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let store = WorkspaceStore::new(pool.clone());
    let queue = JobQueue::new(pool);

    let compute: Arc<dyn ComputeProvider> = Arc::new(HttpCompute::new(
        config.compute_api_url.clone(),
        config.compute_token.clone(),
    ));
    let network: Arc<dyn NetworkProvider> = Arc::new(HttpNetwork::new(
        config.network_api_url.clone(),
        config.network_token.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        compute.clone(),
        network.clone(),
        config.orchestrator_config(),
    ));

    let worker = Worker::new(
        queue,
        Arc::new(JobRouter::new(orchestrator)),
        config.worker_config(),
    );
    worker.start();

    let reconciler = Reconciler::new(
        store,
        compute,
        network,
        Duration::from_secs(config.reconciler_min_age_secs),
    );
    tokio::spawn(run_reconciler(
        reconciler,
        config.reconciler_interval_secs,
        config.reconciler_delete,
    ));
    info!(
        "Reconciler task started (interval: {}s, delete: {})",
        config.reconciler_interval_secs, config.reconciler_delete
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining worker...");
    worker.stop(StopOptions::default()).await;

    Ok(())
}

async fn run_reconciler(reconciler: Reconciler, interval_secs: u64, delete: bool) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;
        match reconciler.run(delete).await {
            Ok(report) if !report.is_empty() && !delete => {
                warn!(
                    orphans = report.total(),
                    "Orphaned resources found; set WSD_RECONCILER_DELETE=true to remove them"
                );
            }
            Ok(_) => {}
            Err(err) => error!("Reconciler sweep failed: {}", err),
        }
    }
}
