//! S3 REST API server binary
//!
//! Loads configuration from the environment, connects the storage backend
//! and serves the REST API until SIGINT or SIGTERM.

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use s3_rest_api::config::Config;
use s3_rest_api::s3::S3Service;
use s3_rest_api::server::Server;
use s3_rest_api::{metrics, storage};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment and optional config file
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing with JSON output for structured logging.
    // RUST_LOG wins over the configured level when set.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Initialize Prometheus metrics
    metrics::init_metrics().context("Failed to register metrics")?;

    info!("Starting S3 REST API");
    info!(?config, "Configuration loaded");

    // Initialize storage backend based on configuration
    let backend = storage::create_backend(&config)
        .await
        .context("Failed to initialize storage backend")?;
    info!(backend = ?config.backend.backend_type, "Storage backend initialized");

    let server = Server::new(config.clone(), S3Service::new(backend));

    info!("Server starting on {}", config.server.bind_address);
    if let Err(e) = server.start(shutdown_signal()).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on the first of CTRL+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install CTRL+C signal handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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
    info!("Received shutdown signal");
}
