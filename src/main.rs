//! # Artist Sync Main Entry Point
//!
//! Boots the sync engine: configuration, telemetry, database, the background
//! scheduler, and the status API server.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use artist_sync::adapters::AdapterRegistry;
use artist_sync::config::ConfigLoader;
use artist_sync::db::init_pool;
use artist_sync::executor::SyncExecutor;
use artist_sync::scheduler::SyncScheduler;
use artist_sync::server::run_server;
use migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from layered env files and variables
    let config = Arc::new(ConfigLoader::new().load()?);

    artist_sync::telemetry::init_tracing(&config)?;
    tracing::info!(profile = %config.profile, "Loaded configuration");
    if let Ok(redacted_json) = config.redacted_json() {
        tracing::debug!("Configuration: {}", redacted_json);
    }

    let db = init_pool(&config).await?;
    Migrator::up(&db, None).await?;

    let adapters = Arc::new(AdapterRegistry::from_config(&config.adapters)?);
    let executor = SyncExecutor::new(
        db.clone(),
        adapters,
        Duration::from_secs(config.scheduler.attempt_timeout_seconds),
    );
    let scheduler = SyncScheduler::new(
        db.clone(),
        executor,
        config.scheduler.clone(),
        config.retry.clone(),
    );

    // The scheduler only stops admitting new attempts on shutdown; in-flight
    // attempts run to their own deadline.
    let shutdown = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    // The server drains on the same token, so SIGINT stops both halves.
    let result = run_server(config, db, shutdown.clone()).await;

    shutdown.cancel();
    let _ = scheduler_handle.await;

    result
}
