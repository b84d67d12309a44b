//! CMS Sync Server
//!
//! Compares and synchronizes Magento CMS blocks and pages between instances.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cms_sync_server::config::Config;
use cms_sync_server::db;
use cms_sync_server::platform::MagentoConnector;
use cms_sync_server::state::AppState;
use cms_sync_server::sync::SyncHistoryRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "cms_sync_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting CMS Sync Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Data directory: {}", config.storage.data_dir.display());

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    if let Some(path) = &config.storage.instances_file {
        let count = db::seed_instances(&db_pool, path).await?;
        tracing::info!("Registered {} instances from {}", count, path.display());
    }

    let interrupted = SyncHistoryRepository::new(&db_pool)
        .mark_interrupted()
        .await
        .context("Failed to close interrupted sync runs")?;
    if interrupted > 0 {
        tracing::warn!("Marked {} interrupted sync runs as failed", interrupted);
    }

    // Create application state
    let connector = Arc::new(MagentoConnector::new(config.platform.clone()));
    let app_state = AppState::new(config.clone(), db_pool, connector);

    let app = cms_sync_server::app(app_state.clone());

    // Start server with graceful shutdown
    let ip = config
        .server
        .host
        .parse()
        .with_context(|| format!("Invalid SERVER_HOST: {}", config.server.host))?;
    let addr = SocketAddr::new(ip, config.server.port);
    tracing::info!("CMS Sync Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    app_state.shutdown().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
