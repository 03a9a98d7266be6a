//! Tally Service - HTTP API for the tally ledger
//!
//! This is the main entry point for the tally service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_service::jobs::spawn_snapshot_job;
use tally_service::{create_router, AppState, ServiceConfig, StoreBackend};
use tally_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tally=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tally Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        store_backend = ?config.store_backend,
        jwt_configured = %config.jwt_secret.is_some(),
        snapshot_interval_secs = ?config.snapshot_interval_seconds,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;

    // Build app state
    let state = AppState::new(store, config.clone());

    if let Some(secs) = config.snapshot_interval_seconds {
        // Runs for the life of the process.
        let _job = spawn_snapshot_job(state.ledger.clone(), Duration::from_secs(secs));
    }

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Open the configured storage backend.
async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StoreBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(tally_store::RocksStore::open(&config.data_dir)?))
        }
        #[cfg(feature = "postgres-backend")]
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL is required for the postgres backend")?;
            tracing::info!("Connecting to PostgreSQL");
            let store =
                tally_store::PgStore::connect(url, config.database_max_connections).await?;
            Ok(Arc::new(store))
        }
        #[allow(unreachable_patterns)]
        other => Err(format!("store backend {other:?} is not compiled into this build").into()),
    }
}
