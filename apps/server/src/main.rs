//! Ensemble Server - headless synchronized-listening server.
//!
//! Hosts the room WebSocket endpoint, the batch extraction endpoint and
//! the range-capable audio stream endpoint as a background daemon.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ensemble_core::{bootstrap_services, start_server};
use tokio::signal;

use crate::config::ServerConfig;

/// Ensemble Server - synchronized listening rooms with audio extraction.
#[derive(Parser, Debug)]
#[command(name = "ensemble-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "ENSEMBLE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Bind port (overrides config file).
    #[arg(short = 'p', long, env = "ENSEMBLE_BIND_PORT")]
    port: Option<u16>,

    /// Identity service base URL (overrides config file).
    #[arg(short = 'i', long, env = "ENSEMBLE_IDENTITY_URL")]
    identity_url: Option<String>,

    /// Audio cache directory (overrides config file).
    #[arg(short = 'd', long, env = "ENSEMBLE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("Ensemble Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(port) = args.port {
        config.bind_port = port;
    }
    if let Some(identity_url) = args.identity_url {
        config.identity_url = identity_url;
    }
    if let Some(cache_dir) = args.cache_dir {
        config.cache_dir = cache_dir;
    }

    log::info!(
        "Configuration: bind_port={}, identity_url={}, cache_dir={}",
        config.bind_port,
        config.identity_url,
        config.cache_dir.display()
    );

    let core_config = Arc::new(config.to_core_config());
    let services = bootstrap_services(&core_config).context("Failed to bootstrap services")?;

    log::info!("Services bootstrapped successfully");

    // Spawn the HTTP server on the main runtime
    let app_state = services.to_app_state(Arc::clone(&core_config));
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(app_state).await {
            log::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, cleaning up...");

    // Graceful shutdown: close WebSocket connections so rooms drain
    services.shutdown();
    server_handle.abort();

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
