//! Payon - Wallet Ledger Service
//!
//! Runs the ledger's background reconciliation against PostgreSQL:
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐    ┌────────────┐
//! │  Config  │───▶│ Postgres │───▶│ Ledger Store │───▶│ Sync Sweep │
//! │  (YAML)  │    │  (pool)  │    │  (sqlx tx)   │    │  (worker)  │
//! └──────────┘    └──────────┘    └──────────────┘    └────────────┘
//! ```
//!
//! Usage: `payon [--env <name>]` (loads `config/<name>.yaml`, default `dev`)

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use payon::config::AppConfig;
use payon::db::Database;
use payon::peer::PeerTracker;
use payon::store::PgLedgerStore;
use payon::sync::{SyncReconciler, SyncSweepWorker};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = payon::logging::init_logging(&app_config);

    tracing::info!(
        env = %env,
        git_hash = env!("GIT_HASH"),
        "Starting Payon ledger"
    );

    let database_url = app_config
        .postgres_url
        .clone()
        .context("postgres_url is not configured and DATABASE_URL is unset")?;
    let db = Database::connect_with(&database_url, &app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check()
        .await
        .context("PostgreSQL health check failed")?;
    if app_config.database.ensure_schema {
        db.ensure_schema()
            .await
            .context("Failed to create ledger schema")?;
    }

    let store = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = if app_config.sync.enabled {
        let worker = SyncSweepWorker::new(
            Arc::new(SyncReconciler::new(store.clone())),
            Arc::new(PeerTracker::new(store.clone())),
            app_config.worker_config(),
        );
        Some(tokio::spawn(async move { worker.run(shutdown_rx).await }))
    } else {
        tracing::warn!("Sync sweep disabled by configuration");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        handle.await.context("Sync sweep worker panicked")?;
    }
    db.pool().close().await;

    tracing::info!("Payon ledger stopped");
    Ok(())
}
