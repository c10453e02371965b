//! Configuration and wire types for the image server

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use zip_blob_store::{StoreStats, SweepConfig};

/// Configuration for the image server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub sweep_interval_secs: u64,
    pub file_ttl_secs: u64,
    /// Base for absolute view URLs; derived from the Host header when unset
    pub public_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            ttl: Duration::from_secs(self.file_ttl_secs),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5555,
            upload_dir: PathBuf::from("static/uploaded_images"),
            allowed_extensions: ["png", "jpg", "jpeg", "gif", "webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            sweep_interval_secs: 60 * 60, // 1 hour
            file_ttl_secs: 24 * 60 * 60,  // 24 hours
            public_url: None,
            max_upload_bytes: 16 * 1024 * 1024, // 16MB
        }
    }
}

/// Successful upload response
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    pub filename: String,
    pub url: String,
}

/// Error body for JSON endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub store: StoreStats,
}
