//! Till settlement server binary.
//!
//! ## Configuration
//! Environment variables:
//! - `TILL_BIND_ADDR` - Listen address (default `0.0.0.0:8080`)
//! - `TILL_DATABASE_PATH` - SQLite file (default `./till.db`)
//! - `TILL_SETTLEMENT_TIMEOUT_MS` - Unit-of-work bound (default 5000)
//! - `TILL_DEFAULT_REORDER_LEVEL` - Reorder level for new stock rows (default 10)
//! - `TILL_SYNC_CONFIG` - Path to sync.toml
//! - `TILL_LOYALTY_*` - Loyalty-cloud overrides, see `till_sync::SyncConfig`
//! - `RUST_LOG` - Log filter (default `info`)

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use till_core::loyalty::TierPolicy;
use till_core::StandardEligibility;
use till_db::{Database, DbConfig};
use till_server::{router, AppState, ServerConfig, TransactionWriter};
use till_sync::{spawn_notifier, SyncConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("Starting till settlement server");

    let config = ServerConfig::load()?;
    info!(
        bind_addr = %config.bind_addr,
        database = %config.database_path.display(),
        timeout_ms = config.settlement_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database_path))
        .await
        .context("opening settlement database")?;

    let mut sync_config = SyncConfig::load_or_default(config.sync_config_path.clone());
    if let Err(e) = sync_config.resolve_endpoint(&db).await {
        warn!(error = %e, "Loyalty endpoint unusable; voucher redemptions will not be sent");
        sync_config.loyalty_cloud.endpoint = None;
    }
    let (notifications, notifier_task) = spawn_notifier(&sync_config)?;

    let state = Arc::new(AppState {
        db: db.clone(),
        writer: TransactionWriter::new(db.clone(), Some(notifications.clone())),
        settlement: config.settlement(),
        eligibility: Arc::new(StandardEligibility),
        tiers: TierPolicy::default(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = notifications.shutdown().await {
        warn!(error = %e, "Notifier already stopped");
    }
    if let Err(e) = notifier_task.await {
        warn!(error = %e, "Notifier task ended abnormally");
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
