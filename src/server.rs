//! JSON HTTP API for the chat client.
//!
//! A thin layer over [`ChatEngine`]: handlers parse the request, call one
//! engine operation and serialize the result.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/messages?after=&limit=` | Messages after a `seq` cursor |
//! | `POST` | `/api/messages` | Post a message; returns notices and any resurfacing |
//! | `POST` | `/api/upload` | Upload a base64-encoded image |
//! | `GET`  | `/api/shared?type=&sort=&limit=` | Shared links and images |
//! | `GET`  | `/api/shared/{id}` | One shared item |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Message is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser client can
//! be served from anywhere.

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::engine::{ChatEngine, ImageUpload, PostOutcome, UploadOutcome};
use crate::error::{EngineError, StoreError};
use crate::models::{ChatMessage, ItemKind, SharedItem, SortOrder};

const DEFAULT_MESSAGE_LIMIT: i64 = 100;
const DEFAULT_SHARED_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 500;
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<ChatEngine>,
}

/// Starts the HTTP server on `[server].bind`.
///
/// Opens the database, then serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(ChatEngine::open(config).await?);
    let bind_addr = config.server.bind.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "server listening");
    println!("LockIn server listening on http://{}", bind_addr);

    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Build the API router around an engine.
pub fn router(engine: Arc<ChatEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/messages", get(handle_list_messages).post(handle_post_message))
        .route("/api/upload", post(handle_upload))
        .route("/api/shared", get(handle_list_shared))
        .route("/api/shared/{id}", get(handle_get_shared))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(AppState { engine })
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

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InvalidInput(msg) => bad_request(msg),
            EngineError::Store(StoreError::NotFound(what)) => {
                not_found(format!("not found: {}", what))
            }
            other => {
                error!(error = %other, "request failed");
                internal(other.to_string())
            }
        }
    }
}

fn clamp_limit(limit: Option<i64>, default: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT)
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

// ============ /api/messages ============

#[derive(Deserialize)]
struct MessagesQuery {
    after: Option<i64>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    let messages = state
        .engine
        .list_messages(
            query.after.unwrap_or(0),
            clamp_limit(query.limit, DEFAULT_MESSAGE_LIMIT),
        )
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

#[derive(Deserialize)]
struct PostMessageRequest {
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
}

async fn handle_post_message(
    State(state): State<AppState>,
    Json(req): Json<PostMessageRequest>,
) -> Result<Json<PostOutcome>, AppError> {
    let outcome = state.engine.post_message(&req.user, &req.text).await?;
    Ok(Json(outcome))
}

// ============ POST /api/upload ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    user: String,
    #[serde(default)]
    file_name: String,
    /// Standard base64 of the file bytes.
    #[serde(default)]
    data: String,
    caption: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadOutcome>, AppError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.data.trim())
        .map_err(|e| bad_request(format!("data is not valid base64: {}", e)))?;

    let outcome = state
        .engine
        .upload_image(ImageUpload {
            author: req.user,
            file_name: req.file_name,
            bytes,
            caption: req.caption,
        })
        .await?;
    Ok(Json(outcome))
}

// ============ /api/shared ============

#[derive(Deserialize)]
struct SharedQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    sort: Option<String>,
    limit: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SharedListResponse {
    shared_items: Vec<SharedItem>,
}

async fn handle_list_shared(
    State(state): State<AppState>,
    Query(query): Query<SharedQuery>,
) -> Result<Json<SharedListResponse>, AppError> {
    let kind = query
        .kind
        .as_deref()
        .map(str::parse::<ItemKind>)
        .transpose()
        .map_err(bad_request)?;
    let sort = query
        .sort
        .as_deref()
        .map(str::parse::<SortOrder>)
        .transpose()
        .map_err(bad_request)?
        .unwrap_or(SortOrder::Recency);

    let shared_items = state
        .engine
        .list_shared(kind, sort, clamp_limit(query.limit, DEFAULT_SHARED_LIMIT))
        .await?;
    Ok(Json(SharedListResponse { shared_items }))
}

async fn handle_get_shared(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SharedItem>, AppError> {
    Ok(Json(state.engine.get_shared(&id).await?))
}
