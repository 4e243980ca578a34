//! Palegate Backend Server
//!
//! Serves the three surfaces of the central node:
//!
//! - `POST /entries/generate[/exit]` - credential issuance
//! - `POST /sync/gate/events` - the gate replication receiver
//! - `GET /dashboard/summary` - kiosk analytics view
//!
//! # Usage
//!
//! ```bash
//! # Default bind on 0.0.0.0:8000
//! palegate-server
//!
//! # Environment overrides
//! PALEGATE_PORT=8080 GATE_API_KEY=... palegate-server
//! ```

mod config;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use palegate_backend::{create_router, ApiConfig, AppState};
use palegate_db::{BackendStore, StoreConfig};
use palegate_token::TokenCodec;

use crate::config::ServerConfig;

/// Palegate backend server
#[derive(Parser, Debug)]
#[command(name = "palegate-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "PALEGATE_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PALEGATE_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PALEGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, env = "PALEGATE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut server_config = ServerConfig::from_env();
    if let Some(host) = args.host {
        server_config.host = host;
    }
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(level) = args.log_level {
        server_config.log_level = level;
    }
    if let Some(format) = args.log_format {
        server_config.log_format = format;
    }

    init_logging(&server_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting palegate backend server"
    );

    // Key material: the backend signs and verifies.
    let private_pem = std::fs::read_to_string(&server_config.private_key_path).map_err(|e| {
        anyhow::anyhow!(
            "cannot read signing key at {} ({e})",
            server_config.private_key_path
        )
    })?;
    let public_pem = std::fs::read_to_string(&server_config.public_key_path).map_err(|e| {
        anyhow::anyhow!(
            "cannot read public key at {} ({e})",
            server_config.public_key_path
        )
    })?;
    let codec = TokenCodec::with_signer(&public_pem, &private_pem)?;

    // Canonical store.
    let store = BackendStore::connect(&StoreConfig::backend_from_env()).await?;
    store.migrate().await?;
    tracing::info!("Backend store ready");

    let api_config = ApiConfig::from_env();
    if api_config.gate_api_key.is_none() {
        tracing::warn!("GATE_API_KEY is not set; the sync endpoint will refuse all requests");
    }

    let state = Arc::new(AppState::new(store, codec, api_config));
    let app = create_router(state);

    let addr = server_config.socket_addr()?;
    tracing::info!(%addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_logging(config: &ServerConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(true)
            .init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .pretty()
            .with_target(true)
            .init(),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
