//! Emoji Service - HTTP API for emoji generation and the shared feed
//!
//! This is the main entry point for the emoji service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emoji_service::{create_router, AppState, ServiceConfig};
use emoji_store::{BlobStore, LocalBlobStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,emoji=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Emoji Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        replicate_configured = %config.replicate_api_token.is_some(),
        model_version = %config.model_version,
        admin_emails = config.admin_emails.len(),
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    tracing::info!(path = %config.blob_dir, base_url = %config.public_base_url, "Using local blob storage");
    tokio::fs::create_dir_all(&config.blob_dir).await?;
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
        &config.blob_dir,
        &config.public_base_url,
    ));

    // Build app state
    let state = AppState::new(store, blobs, config.clone());

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    use emoji_store::{ChangeFeed, RocksStore};

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let feed = ChangeFeed::new(config.event_buffer);
    Ok(Arc::new(RocksStore::open_with_feed(&config.data_dir, feed)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    use emoji_store::MemoryStore;

    tracing::warn!("Built without rocksdb-backend, state is kept in memory only");
    Ok(Arc::new(MemoryStore::with_feed_capacity(config.event_buffer)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown signal received");
}
