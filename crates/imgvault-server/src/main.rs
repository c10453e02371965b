//! imgvault - ephemeral image hosting
//!
//! Accepts image uploads, stores each one as a single-entry ZIP archive under
//! a random identifier, serves it back inline, and deletes archives once they
//! are older than the retention window.

mod error;
mod server;
mod types;

use crate::error::{Result, ServerError};
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ServerConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};
use zip_blob_store::{spawn_sweeper, BlobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("imgvault=info".parse()?)
        .add_directive("zip_blob_store=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting imgvault...");

    // Load configuration from environment
    let config = load_config()?;
    info!("Port: {}", config.port);
    info!("Upload dir: {:?}", config.upload_dir);
    info!("Allowed extensions: {}", config.allowed_extensions.join(", "));
    info!(
        "Sweep every {} seconds, TTL {} seconds",
        config.sweep_interval_secs, config.file_ttl_secs
    );

    let store = Arc::new(BlobStore::new(
        config.upload_dir.clone(),
        &config.allowed_extensions,
    ));
    store.init().await?;

    let sweeper = spawn_sweeper(store.clone(), config.sweep_config());

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let state: SharedState = Arc::new(ServerState::new(
        store,
        config.public_url.clone(),
        config.max_upload_bytes,
    ));

    // Serve until a shutdown signal arrives
    let served = start_server(state, config.port, shutdown.clone()).await;

    shutdown.cancel();
    sweeper.shutdown().await;
    info!("imgvault stopped");

    served?;
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}

fn load_config() -> Result<ServerConfig> {
    let defaults = ServerConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let upload_dir = std::env::var("UPLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or(defaults.upload_dir);

    let allowed_extensions = match std::env::var("ALLOWED_EXTENSIONS") {
        Ok(raw) => parse_extensions(&raw),
        Err(_) => defaults.allowed_extensions,
    };
    if allowed_extensions.is_empty() {
        return Err(ServerError::Config(
            "ALLOWED_EXTENSIONS must name at least one extension".to_string(),
        ));
    }

    let sweep_interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(defaults.sweep_interval_secs);

    let file_ttl_secs = std::env::var("FILE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(defaults.file_ttl_secs);

    let public_url = std::env::var("PUBLIC_URL").ok().filter(|s| !s.is_empty());

    let max_upload_bytes = std::env::var("MAX_UPLOAD_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(defaults.max_upload_bytes);

    Ok(ServerConfig {
        port,
        upload_dir,
        allowed_extensions,
        sweep_interval_secs,
        file_ttl_secs,
        public_url,
        max_upload_bytes,
    })
}

/// Split a comma list into trimmed, lowercased, dot-free extensions
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
