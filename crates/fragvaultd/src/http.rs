//! HTTP ingress: upload, list, download, status.
//!
//! The ingress stays thin: it authenticates, rate-limits, stages bytes
//! to disk, and maps the core error taxonomy onto status codes. All
//! storage semantics live in the catalog and engine.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, DefaultBodyLimit, Path as UrlPath, Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

use fragvault_core::types::FileDescriptor;
use fragvault_core::VaultError;
use fragvault_crypto::KeyManager;
use fragvault_engine::FileCatalog;
use fragvault_store::LocalShardStore;

const RATE_LIMIT_PER_MINUTE: u32 = 60;

#[derive(Clone)]
pub struct AppState {
    catalog: Arc<FileCatalog>,
    shards: Arc<LocalShardStore>,
    keys: Arc<KeyManager>,
    auth_token: Option<String>,
    max_file_size: u64,
    visitors: Arc<Mutex<HashMap<IpAddr, Visitor>>>,
}

struct Visitor {
    last_seen: Instant,
    requests: u32,
}

impl AppState {
    pub fn new(
        catalog: Arc<FileCatalog>,
        shards: Arc<LocalShardStore>,
        keys: Arc<KeyManager>,
        auth_token: Option<String>,
        max_file_size: u64,
    ) -> Self {
        Self {
            catalog,
            shards,
            keys,
            auth_token,
            max_file_size,
            visitors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Sliding one-minute window per client IP.
    fn admit(&self, ip: IpAddr) -> bool {
        let mut visitors = match self.visitors.lock() {
            Ok(v) => v,
            Err(_) => return true,
        };
        let now = Instant::now();
        let visitor = visitors.entry(ip).or_insert(Visitor {
            last_seen: now,
            requests: 0,
        });
        if now.duration_since(visitor.last_seen) > Duration::from_secs(60) {
            visitor.last_seen = now;
            visitor.requests = 0;
        }
        visitor.requests += 1;
        visitor.requests <= RATE_LIMIT_PER_MINUTE
    }
}

pub fn build_router(state: AppState, max_file_size: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/upload", post(upload))
        .route("/files", get(list_files))
        .route("/download/{file_id}", get(download))
        .route("/status", get(status))
        .layer(middleware::from_fn_with_state(state.clone(), auth_guard))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(max_file_size as usize + 1))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'self'"),
        ))
        .layer(cors)
        .with_state(state)
}

async fn auth_guard(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    if let Some(ref token) = state.auth_token {
        let authorized = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|presented| presented == token)
            .unwrap_or(false);
        if !authorized {
            return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
        }
    }
    next.run(req).await
}

async fn rate_limit(
    State(state): State<AppState>,
    req: axum::http::Request<Body>,
    next: Next,
) -> Response {
    let ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    if let Some(ip) = ip {
        if !state.admit(ip) {
            return error_response(StatusCode::TOO_MANY_REQUESTS, "too many requests");
        }
    }
    next.run(req).await
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    file_name: String,
    note: Option<String>,
}

/// Descriptor plus a human-readable size for listings.
#[derive(Serialize)]
struct FileView {
    #[serde(flatten)]
    descriptor: FileDescriptor,
    file_size_display: String,
}

impl From<FileDescriptor> for FileView {
    fn from(descriptor: FileDescriptor) -> Self {
        let file_size_display = format_file_size(descriptor.file_size);
        Self {
            descriptor,
            file_size_display,
        }
    }
}

async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if body.len() as u64 > state.max_file_size {
        return Err(ApiError(VaultError::InvalidInput(format!(
            "file too large: {} bytes (maximum {})",
            body.len(),
            state.max_file_size
        ))));
    }
    let file_name = sanitize_file_name(&params.file_name)?;

    // Stage the body to disk; the engine consumes whole files by path.
    let staging = std::env::temp_dir().join(format!("fragvault-ingest-{}", random_suffix()));
    tokio::fs::create_dir_all(&staging).await.map_err(wrap_io)?;
    let staged_path = staging.join(&file_name);

    let result = async {
        tokio::fs::write(&staged_path, &body).await.map_err(wrap_io)?;
        state
            .catalog
            .upload(&staged_path, params.note.clone(), &CancellationToken::new())
            .await
            .map_err(ApiError)
    }
    .await;

    if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
        warn!(staging = %staging.display(), "staging cleanup failed: {e}");
    }

    let descriptor = result?;
    info!(file_id = %descriptor.file_id, file_name = %descriptor.file_name, "upload accepted");
    Ok((StatusCode::OK, Json(FileView::from(descriptor))))
}

async fn list_files(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let files: Vec<FileView> = state
        .catalog
        .list()
        .await
        .map_err(ApiError)?
        .into_iter()
        .map(FileView::from)
        .collect();
    Ok(Json(serde_json::json!({ "files": files })))
}

async fn download(
    State(state): State<AppState>,
    UrlPath(file_id): UrlPath<String>,
) -> Result<Response, ApiError> {
    let descriptor = state.catalog.describe(&file_id).await.map_err(ApiError)?;
    let path = state
        .catalog
        .download(&file_id, &CancellationToken::new())
        .await
        .map_err(ApiError)?;

    let file = tokio::fs::File::open(&path).await.map_err(wrap_io)?;
    let stream = tokio_util::io::ReaderStream::new(file);

    let disposition = format!("attachment; filename=\"{}\"", descriptor.file_name);
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, disposition)
        .header(header::CONTENT_LENGTH, descriptor.file_size)
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError(VaultError::Internal(anyhow::anyhow!("response build: {e}"))))?;
    Ok(response)
}

#[derive(Serialize)]
struct StatusResponse {
    files: usize,
    local_shards: usize,
    active_key_version: String,
}

async fn status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let files = state.catalog.list().await.map_err(ApiError)?.len();
    let local_shards = state.shards.count().map_err(ApiError)?;
    let (active_key_version, _) = state.keys.active().map_err(ApiError)?;

    Ok(Json(StatusResponse {
        files,
        local_shards,
        active_key_version,
    }))
}

/// Keep staged uploads inside the staging directory: basenames only.
fn sanitize_file_name(name: &str) -> Result<String, ApiError> {
    if name.is_empty()
        || name.len() > 255
        || name.contains('/')
        || name.contains('\\')
        || name.contains('"')
        || name.chars().any(|c| c.is_control())
        || name == "."
        || name == ".."
    {
        return Err(ApiError(VaultError::InvalidInput(format!(
            "invalid file name: {name:?}"
        ))));
    }
    Ok(name.to_string())
}

fn random_suffix() -> String {
    let mut raw = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Convert a byte count to a human-readable string.
fn format_file_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if size < KB {
        format!("{size} B")
    } else if size < MB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else {
        format!("{:.2} GB", size as f64 / GB as f64)
    }
}

struct ApiError(VaultError);

fn wrap_io(e: std::io::Error) -> ApiError {
    ApiError(VaultError::Io(e))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            VaultError::InvalidInput(_) | VaultError::InvalidKeyLength { .. } => {
                StatusCode::BAD_REQUEST
            }
            VaultError::MetadataNotFound { .. } => StatusCode::NOT_FOUND,
            VaultError::MetadataConflict { .. } => StatusCode::CONFLICT,
            VaultError::RemotePutFailed { .. } | VaultError::FragmentUnavailable { .. } => {
                StatusCode::BAD_GATEWAY
            }
            VaultError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            VaultError::UnknownKeyVersion { .. }
            | VaultError::AuthenticationFailed
            | VaultError::MalformedFrame { .. }
            | VaultError::ObjectNotFound { .. }
            | VaultError::LocalPersistFailed { .. }
            | VaultError::Io(_)
            | VaultError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            warn!(status = %status, "request failed: {}", self.0);
        }
        error_response(status, &self.0.to_string())
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = Json(serde_json::json!({
        "code": status.as_u16(),
        "message": message,
    }));
    (status, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_formatting() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.00 KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_file_size(5 * 1024 * 1024 * 1024), "5.00 GB");
    }

    #[test]
    fn file_name_sanitization() {
        assert!(sanitize_file_name("report.pdf").is_ok());
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("../etc/passwd").is_err());
        assert!(sanitize_file_name("a/b").is_err());
        assert!(sanitize_file_name("a\\b").is_err());
        assert!(sanitize_file_name("a\"b").is_err());
        assert!(sanitize_file_name("a\nb").is_err());
        assert!(sanitize_file_name("..").is_err());
        assert!(sanitize_file_name(&"x".repeat(256)).is_err());
    }
}
