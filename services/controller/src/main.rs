//! Celery fleet controller
//!
//! Seeds fleets from a manifest into an in-memory store and keeps them
//! reconciled until interrupted.

use std::sync::Arc;

use anyhow::Result;
use fleet_controller::{config, manifest, ControllerWorker, MemoryStore};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEET_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleet controller");
    info!(
        resync_secs = config.resync_interval.as_secs(),
        namespace = %config.namespace,
        "Configuration loaded"
    );

    let store = Arc::new(MemoryStore::new());

    if let Some(path) = &config.manifest {
        let fleets = match manifest::load(path, &config.namespace) {
            Ok(fleets) => fleets,
            Err(e) => {
                error!(error = %e, path = %path.display(), "Failed to load manifest");
                return Err(e);
            }
        };
        let created = manifest::seed(store.as_ref(), fleets).await?;
        info!(created, path = %path.display(), "Seeded fleets from manifest");
    } else {
        warn!("FLEET_MANIFEST not set, starting with an empty store");
    }

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = ControllerWorker::new(store.clone(), config.worker_config());
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);

    let shutdown_timeout = std::time::Duration::from_secs(10);
    if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
        warn!(error = %e, "Controller worker did not shut down in time");
    }

    info!("Fleet controller shutdown complete");
    Ok(())
}
