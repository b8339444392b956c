//! Weir Agent
//!
//! Runs the pipelines listed in a YAML manifest and keeps them in sync with
//! it: a converge cycle runs at startup and, with automatic reload enabled,
//! again on every reload interval until Ctrl-C.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weir_agent::config::AgentConfig;
use weir_agent::engine::LuaEngine;
use weir_agent::repository::ManifestSource;
use weir_agent::scheduler::ReloadDriver;
use weir_agent::service::Orchestrator;
use weir_core::metrics::MetricStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weir_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Weir Agent");

    let config = AgentConfig::from_env().context("Failed to load configuration")?;
    info!(
        pipelines_file = %config.pipelines_file.display(),
        reload_automatic = config.reload_automatic,
        reload_interval = ?config.reload_interval,
        batch_size = config.batch_size,
        "Loaded configuration"
    );

    let source = Arc::new(ManifestSource::new(config.pipelines_file.clone()));
    let engine = Arc::new(LuaEngine::new(config.batch_size));
    let orchestrator = Orchestrator::new(source, engine, MetricStore::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver = ReloadDriver::from_config(orchestrator.clone(), &config);
    let driver_task = tokio::spawn(async move { driver.run(shutdown_rx).await });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    // The driver may already be gone if it panicked
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_task.await {
        warn!("Reload driver panicked: {}", e);
    }

    orchestrator.shutdown().await;
    info!("Weir Agent stopped");

    Ok(())
}
