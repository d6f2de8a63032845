//! JSON HTTP API for the archive's web layer.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/fingerprint` | Hash one image given as `url`, `path` or `bytes_base64` |
//! | `POST` | `/images/{type}/{id}` | Hash and save a document's images |
//! | `POST` | `/images/{type}/check` | Hash images and report existing matches |
//! | `POST` | `/images/{type}/matches` | Documents holding an image hash |
//! | `POST` | `/duplicates/{type}` | Near-duplicate text candidates |
//! | `POST` | `/chunks` | Preview how text would be chunked |
//!
//! The request's `Host` header is trusted for remote image fetches made
//! while serving that request.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "unknown document type: 'budget'" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, State},
    http::{header::HOST, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use archive_core::chunk::split;
use archive_core::duplicate::{find_duplicates, DuplicateRequest};
use archive_core::image_index::find_matches;
use archive_core::models::{
    ChunkPiece, DocumentType, DuplicateCandidate, FingerprintEntry, ImageMatch,
};
use archive_core::normalize::clean_markup;
use archive_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::fingerprint::{ImageFingerprinter, ImageSource};
use crate::images::{check_images, hash_document_images, ImageCheck};
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub fingerprinter: Arc<ImageFingerprinter>,
}

/// Starts the HTTP server on `[server].bind`. Runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let state = AppState {
        config: Arc::new(config.clone()),
        store: Arc::new(SqliteStore::new(pool)),
        fingerprinter: Arc::new(ImageFingerprinter::from_config(config)?),
    };

    let bind_addr = config.server.bind.clone();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(
        addr = %bind_addr,
        trusted_hosts = ?state.fingerprinter.trusted_hosts().hosts().collect::<Vec<_>>(),
        "archive API listening"
    );
    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Build the API router over the given state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/fingerprint", post(handle_fingerprint))
        .route("/images/{doc_type}/check", post(handle_check_images))
        .route("/images/{doc_type}/matches", post(handle_image_matches))
        .route("/images/{doc_type}/{id}", post(handle_save_images))
        .route("/duplicates/{doc_type}", post(handle_duplicates))
        .route("/chunks", post(handle_chunks))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!(error = %format!("{:#}", err), "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

fn parse_type(raw: &str) -> Result<DocumentType, AppError> {
    raw.parse::<DocumentType>()
        .map_err(|e| bad_request(e.to_string()))
}

fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers.get(HOST).and_then(|v| v.to_str().ok())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /fingerprint ============

#[derive(Deserialize)]
struct FingerprintRequest {
    url: Option<String>,
    path: Option<String>,
    bytes_base64: Option<String>,
}

#[derive(Serialize)]
struct FingerprintResponse {
    hash: Option<String>,
}

async fn handle_fingerprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FingerprintRequest>,
) -> Result<Json<FingerprintResponse>, AppError> {
    let source = match (req.url, req.path, req.bytes_base64) {
        (Some(url), None, None) => ImageSource::Url(url),
        (None, Some(path), None) => ImageSource::Path(path),
        (None, None, Some(encoded)) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.trim())
                .map_err(|e| bad_request(format!("bytes_base64 is not valid base64: {}", e)))?;
            ImageSource::Bytes(bytes)
        }
        _ => {
            return Err(bad_request(
                "exactly one of url, path or bytes_base64 is required",
            ))
        }
    };

    let hash = state
        .fingerprinter
        .compute_fingerprint(&source, request_host(&headers))
        .await;
    Ok(Json(FingerprintResponse { hash }))
}

// ============ POST /images/{type}/{id} ============

#[derive(Deserialize, Default)]
struct SaveImagesRequest {
    /// Pipe-delimited image list. Defaults to the stored document's field.
    images: Option<String>,
}

#[derive(Serialize)]
struct SaveImagesResponse {
    document_id: i64,
    saved: usize,
    entries: Vec<FingerprintEntry>,
}

async fn handle_save_images(
    State(state): State<AppState>,
    Path((doc_type, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Option<Json<SaveImagesRequest>>,
) -> Result<Json<SaveImagesResponse>, AppError> {
    let doc_type = parse_type(&doc_type)?;
    let id: i64 = id
        .parse()
        .map_err(|_| bad_request(format!("invalid document id: '{}'", id)))?;
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let field = match req.images {
        Some(images) => images,
        None => state
            .store
            .get_document(doc_type, id)
            .await
            .map_err(internal)?
            .ok_or_else(|| not_found(format!("{} {} not found", doc_type, id)))?
            .image_path
            .unwrap_or_default(),
    };

    let entries = hash_document_images(
        state.store.as_ref(),
        &state.fingerprinter,
        doc_type,
        id,
        &field,
        request_host(&headers),
    )
    .await
    .map_err(internal)?;

    Ok(Json(SaveImagesResponse {
        document_id: id,
        saved: entries.iter().filter(|e| e.hash.is_some()).count(),
        entries,
    }))
}

// ============ POST /images/{type}/check ============

#[derive(Deserialize)]
struct CheckImagesRequest {
    images: String,
    exclude_id: Option<i64>,
}

#[derive(Serialize)]
struct CheckImagesResponse {
    images: Vec<ImageCheck>,
}

async fn handle_check_images(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CheckImagesRequest>,
) -> Result<Json<CheckImagesResponse>, AppError> {
    let doc_type = parse_type(&doc_type)?;
    let images = check_images(
        state.store.as_ref(),
        &state.fingerprinter,
        doc_type,
        &req.images,
        req.exclude_id,
        request_host(&headers),
    )
    .await;
    Ok(Json(CheckImagesResponse { images }))
}

// ============ POST /images/{type}/matches ============

#[derive(Deserialize)]
struct ImageMatchRequest {
    hash: String,
    exclude_id: Option<i64>,
}

#[derive(Serialize)]
struct ImageMatchResponse {
    matches: Vec<ImageMatch>,
}

async fn handle_image_matches(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
    Json(req): Json<ImageMatchRequest>,
) -> Result<Json<ImageMatchResponse>, AppError> {
    let doc_type = parse_type(&doc_type)?;
    let matches = find_matches(state.store.as_ref(), doc_type, &req.hash, req.exclude_id).await;
    Ok(Json(ImageMatchResponse { matches }))
}

// ============ POST /duplicates/{type} ============

#[derive(Deserialize)]
struct DuplicatesRequest {
    text: String,
    exclude_id: Option<i64>,
    candidate_limit: Option<usize>,
    match_limit: Option<usize>,
}

#[derive(Serialize)]
struct DuplicatesResponse {
    candidates: Vec<DuplicateCandidate>,
}

async fn handle_duplicates(
    State(state): State<AppState>,
    Path(doc_type): Path<String>,
    Json(req): Json<DuplicatesRequest>,
) -> Result<Json<DuplicatesResponse>, AppError> {
    let doc_type = parse_type(&doc_type)?;
    let dup = &state.config.duplicates;

    let request = DuplicateRequest {
        document_type: doc_type,
        text: &req.text,
        exclude_document_id: req.exclude_id,
        candidate_limit: req.candidate_limit.unwrap_or(dup.candidate_limit),
        match_limit: req.match_limit.unwrap_or(dup.match_limit),
    };
    let candidates = find_duplicates(state.store.as_ref(), &request, &dup.params()).await;
    Ok(Json(DuplicatesResponse { candidates }))
}

// ============ POST /chunks ============

#[derive(Deserialize)]
struct ChunksRequest {
    text: String,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
}

#[derive(Serialize)]
struct ChunksResponse {
    chunks: Vec<ChunkPiece>,
}

async fn handle_chunks(
    State(state): State<AppState>,
    Json(req): Json<ChunksRequest>,
) -> Result<Json<ChunksResponse>, AppError> {
    let chunk_size = req.chunk_size.unwrap_or(state.config.chunking.chunk_size);
    let overlap = req.overlap.unwrap_or(state.config.chunking.overlap);
    if chunk_size == 0 {
        return Err(bad_request("chunk_size must be > 0"));
    }

    let chunks = split(&clean_markup(&req.text), chunk_size, overlap);
    Ok(Json(ChunksResponse { chunks }))
}
