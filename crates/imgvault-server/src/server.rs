//! HTTP server for the image endpoints
//!
//! Provides /, /upload, /view_image/{id}, and /health.

use crate::error::ApiError;
use crate::types::{HealthResponse, UploadResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use zip_blob_store::{ArchiveError, BlobStore, StoreError};

const INDEX_HTML: &str = include_str!("../static/index.html");

const UPLOAD_FIELD: &str = "file";

/// Shared state for the HTTP server
pub struct ServerState {
    pub store: Arc<BlobStore>,
    pub public_url: Option<String>,
    pub max_upload_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(store: Arc<BlobStore>, public_url: Option<String>, max_upload_bytes: usize) -> Self {
        Self {
            store,
            public_url: public_url.map(|url| url.trim_end_matches('/').to_string()),
            max_upload_bytes,
            started_at: Utc::now(),
        }
    }

    /// Absolute URL of the view endpoint for `id`
    fn view_url(&self, headers: &HeaderMap, id: &str) -> String {
        let path = format!("/view_image/{}", id);
        if let Some(base) = &self.public_url {
            return format!("{}{}", base, path);
        }

        match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => format!("http://{}{}", host, path),
            None => path,
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/view_image/{id}", get(view_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` is cancelled
pub async fn start_server(
    state: SharedState,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

/// Upload form
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let store = state.store.stats().await.unwrap_or_else(|e| {
        warn!(error = %e, "Failed to collect store stats");
        Default::default()
    });
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        store,
    })
}

/// Accept a multipart upload in field `file` and store it
async fn upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(UPLOAD_FIELD) {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await?;
            upload = Some((filename, data));
            break;
        }
    }

    let (filename, data) = upload.ok_or_else(|| ApiError::BadRequest("No file part".to_string()))?;
    if filename.is_empty() {
        return Err(ApiError::BadRequest("No selected file".to_string()));
    }

    let id = match state.store.put(&filename, data.to_vec()).await {
        Ok(id) => id,
        Err(e) if e.is_rejected_extension() => {
            return Err(ApiError::BadRequest("文件类型不被允许".to_string()));
        }
        Err(e) => {
            warn!(filename = %filename, error = %e, "Upload rejected");
            return Err(ApiError::BadRequest(format!(
                "无效的图片文件或服务器错误: {}",
                e
            )));
        }
    };

    Ok(Json(UploadResponse {
        success: true,
        filename: format!("{}.zip", id),
        url: state.view_url(&headers, &id),
    }))
}

/// Serve the image stored under `id` inline
async fn view_image(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    match state.store.get(&id).await {
        Ok(image) => (
            [
                (header::CONTENT_TYPE, image.mime_type),
                (header::CONTENT_DISPOSITION, "inline".to_string()),
            ],
            image.data,
        )
            .into_response(),
        Err(StoreError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "图片文件未找到或已过期删除。").into_response()
        }
        Err(StoreError::Archive(ArchiveError::Empty)) => {
            warn!(id = %id, "Archive is empty");
            (StatusCode::INTERNAL_SERVER_ERROR, "ZIP 存档为空。").into_response()
        }
        Err(e) if e.is_corrupt() => {
            warn!(id = %id, error = %e, "Archive is corrupt");
            (StatusCode::INTERNAL_SERVER_ERROR, "无效的 ZIP 存档。").into_response()
        }
        Err(e) => {
            error!(id = %id, error = %e, "Failed to load image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("加载图片时发生错误: {}", e),
            )
                .into_response()
        }
    }
}
