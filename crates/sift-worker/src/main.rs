//! sift-worker binary — drains the scan queue and persists findings.

mod config;
mod health;
mod main_loop;
mod metrics;
mod processor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use sift_connectors::{load_aws_config, ObjectStoreClient, QueueClient};
use sift_store::{Database, DbConfig};

use config::WorkerConfig;
use health::HealthState;
use metrics::WorkerMetrics;
use processor::Processor;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = WorkerConfig::from_env()?;
    info!("Initialized scanner worker");
    info!("  Queue URL: {}", config.queue_url);
    info!("  Batch size: {}", config.batch_size);
    info!("  Max workers: {}", config.max_workers);
    info!("  Max file size: {}MB", config.max_file_size_mb);

    let db = Database::connect(&DbConfig::from_env()?).await?;

    let aws_config = load_aws_config(config.region.clone()).await;
    let store = ObjectStoreClient::new(&aws_config);
    let queue = QueueClient::new(&aws_config, &config.queue_url);

    let worker_metrics = WorkerMetrics::new();

    // Health/readiness state
    let ready = Arc::new(AtomicBool::new(true));
    let health_state = Arc::new(HealthState {
        metrics: worker_metrics.clone(),
        ready: ready.clone(),
    });

    // Start metrics/health HTTP server
    let metrics_port = config.metrics_port;
    let health_router = health::health_router(health_state);
    tokio::spawn(async move {
        let addr = format!("0.0.0.0:{}", metrics_port);
        info!("Metrics server listening on {}", addr);
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        axum::serve(listener, health_router).await.unwrap();
    });

    let shutdown = install_signal_handlers()?;

    let processor = Processor::new(db, store, config.max_file_size_bytes());
    main_loop::run_worker_loop(config, queue, processor, worker_metrics, shutdown).await?;

    info!("Scanner worker exited");
    Ok(())
}

/// Cooperative shutdown: SIGINT/SIGTERM set a flag the loop checks between
/// iterations, so the in-flight batch always completes.
fn install_signal_handlers() -> Result<Arc<AtomicBool>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        }
        flag.store(true, Ordering::Relaxed);
    });

    Ok(shutdown)
}
