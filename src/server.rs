//! HTTP API server.
//!
//! Exposes the ingestion and chat pipeline as a JSON HTTP API for the
//! presentation layer (dashboards, upload forms, chat UI).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents` | Upload a document (dedup-checked) |
//! | `GET`  | `/documents` | List documents in the caller's categories |
//! | `DELETE` | `/documents/{id}` | Delete a document, its chunks, and blob |
//! | `POST` | `/ingest` | Run the processing pipeline for a document |
//! | `POST` | `/chat` | Role-scoped retrieval-augmented chat (SSE) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Non-streaming error responses are `{"error": <message>}` with the status
//! carrying the classification: 401 credential, 403 ownership, 400 shape,
//! 404 missing document, 409 duplicate, 429/402 upstream throttling/quota,
//! 500 anything else (detail kept in server-side logs only).
//!
//! # Streaming
//!
//! `/chat` responds with `text/event-stream`: one `{"sources": [...]}` frame
//! first when any sources were retrieved, then the upstream model's native
//! delta frames verbatim, ending with the upstream terminal marker. The
//! handler persists the user turn before invoking the orchestrator and the
//! assistant turn after the stream completes.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine;
use futures::channel::mpsc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::auth::{self, AuthError, AuthedUser};
use crate::chat::{self, ChatError};
use crate::config::Config;
use crate::dedup;
use crate::embedding::{self, Embedder};
use crate::extract;
use crate::ingest;
use crate::models::{Category, ChatMessage, Document, Source};
use crate::storage::BlobStore;
use crate::stream::{ChatStreamReader, StreamEvent};
use crate::{db, migrate};

/// Shared application state. Built once at startup and never mutated.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    pool: SqlitePool,
    store: Arc<BlobStore>,
    embedder: Option<Arc<dyn Embedder>>,
}

/// Starts the HTTP API server. Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let pool = db::connect(config).await?;
    migrate::run_migrations(&pool).await?;

    let embedder = embedding::create_embedder(&config.gateway);
    if embedder.is_none() {
        println!(
            "Embeddings disabled ({} not set); ingestion will store chunks without vectors.",
            config.gateway.api_key_env
        );
    }

    let state = AppState {
        config: Arc::new(config.clone()),
        pool,
        store: Arc::new(BlobStore::new(config.storage.root.clone())),
        embedder,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/documents", post(handle_upload).get(handle_list_documents))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/ingest", post(handle_ingest))
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("askbase API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// Internal error type that converts into an Axum HTTP response with the
/// `{"error": <message>}` body.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

fn auth_error(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        message: message.into(),
    }
}

fn forbidden(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::FORBIDDEN,
        message: message.into(),
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        message: message.into(),
    }
}

fn conflict(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::CONFLICT,
        message: message.into(),
    }
}

/// 500 with a generalized message; the detail goes to server-side logs only.
fn internal(err: impl std::fmt::Display) -> AppError {
    eprintln!("Error: {}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "Internal server error".to_string(),
    }
}

fn map_auth_error(err: AuthError) -> AppError {
    match err {
        AuthError::Rejected(message) => auth_error(message),
        AuthError::Internal(e) => internal(e),
    }
}

fn map_chat_error(err: ChatError) -> AppError {
    match err {
        ChatError::RateLimited => AppError {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: "Rate limit exceeded. Please try again in a moment.".to_string(),
        },
        ChatError::QuotaExceeded => AppError {
            status: StatusCode::PAYMENT_REQUIRED,
            message: "AI usage limit reached. Please add credits.".to_string(),
        },
        ChatError::Upstream(detail) => {
            eprintln!("Error: AI gateway failure: {}", detail);
            AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "AI gateway error".to_string(),
            }
        }
        ChatError::Internal(e) => internal(e),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthedUser, AppError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    auth::authenticate(&state.pool, &state.config, authorization)
        .await
        .map_err(map_auth_error)
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

// ============ POST /documents ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    title: String,
    file_name: String,
    category: String,
    mime_type: String,
    content_base64: String,
    /// Admin-only: delete the duplicate and proceed as a fresh upload.
    #[serde(default)]
    replace: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DocumentBody {
    id: String,
    title: String,
    file_name: String,
    file_path: String,
    mime_type: String,
    size_bytes: i64,
    category: Category,
    processed: bool,
    uploaded_by: String,
    created_at: i64,
}

impl From<Document> for DocumentBody {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            file_name: doc.file_name,
            file_path: doc.file_path,
            mime_type: doc.mime_type,
            size_bytes: doc.size_bytes,
            category: doc.category,
            processed: doc.processed,
            uploaded_by: doc.uploaded_by,
            created_at: doc.created_at,
        }
    }
}

async fn handle_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let req: UploadRequest =
        serde_json::from_value(params).map_err(|e| bad_request(e.to_string()))?;

    if req.title.trim().is_empty() {
        return Err(bad_request("title must not be empty"));
    }
    if req.file_name.trim().is_empty() {
        return Err(bad_request("fileName must not be empty"));
    }
    if !extract::is_supported_mime_type(&req.mime_type) {
        return Err(bad_request(format!(
            "unsupported mime type: {}",
            req.mime_type
        )));
    }
    let category =
        Category::parse(&req.category).map_err(|e| bad_request(e.to_string()))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&req.content_base64)
        .map_err(|_| bad_request("contentBase64 is not valid base64"))?;

    // Duplicate check. Best-effort: nothing locks the check-then-act window.
    let content_hash = dedup::compute_content_hash(&bytes);
    if let Some(existing) = dedup::find_duplicate(&state.pool, &content_hash, &req.file_name)
        .await
        .map_err(internal)?
    {
        if !(user.role.is_admin() && req.replace) {
            return Err(conflict(format!(
                "A document with the same {} already exists: {}",
                existing.match_type.as_str(),
                existing.title
            )));
        }
        // Admin replace flow: remove the old blob, chunks, and record, then
        // proceed as a fresh upload.
        if let Some(old) = ingest::fetch_document(&state.pool, &existing.id)
            .await
            .map_err(internal)?
        {
            ingest::delete_document(&state.pool, &state.store, &old)
                .await
                .map_err(internal)?;
        }
    }

    let file_path = blob_key(&user.id, &req.file_name);
    state.store.put(&file_path, &bytes).map_err(internal)?;

    let doc = Document {
        id: Uuid::new_v4().to_string(),
        title: req.title,
        file_name: req.file_name,
        file_path,
        mime_type: req.mime_type,
        size_bytes: bytes.len() as i64,
        category,
        content_hash,
        processed: false,
        uploaded_by: user.id,
        created_at: chrono::Utc::now().timestamp(),
    };
    ingest::insert_document(&state.pool, &doc)
        .await
        .map_err(internal)?;

    Ok(Json(serde_json::json!({
        "document": DocumentBody::from(doc)
    })))
}

/// Opaque storage key: `<uploader-id>/<uuid>.<ext>`.
fn blob_key(user_id: &str, file_name: &str) -> String {
    let ext: String = file_name
        .rsplit_once('.')
        .map(|(_, e)| e.chars().filter(|c| c.is_ascii_alphanumeric()).collect())
        .unwrap_or_default();
    if ext.is_empty() {
        format!("{}/{}", user_id, Uuid::new_v4())
    } else {
        format!("{}/{}.{}", user_id, Uuid::new_v4(), ext)
    }
}

// ============ GET /documents ============

async fn handle_list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;

    let docs = ingest::list_documents(&state.pool, user.role.allowed_categories())
        .await
        .map_err(internal)?;

    let documents: Vec<DocumentBody> = docs.into_iter().map(DocumentBody::from).collect();
    Ok(Json(serde_json::json!({ "documents": documents })))
}

// ============ DELETE /documents/{id} ============

async fn handle_delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = authenticate(&state, &headers).await?;

    let doc = ingest::fetch_document(&state.pool, &id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("document not found: {}", id)))?;

    if doc.uploaded_by != user.id && !user.role.is_admin() {
        return Err(forbidden("only the uploader or an admin may delete this document"));
    }

    ingest::delete_document(&state.pool, &state.store, &doc)
        .await
        .map_err(internal)?;

    Ok(Json(serde_json::json!({ "success": true })))
}

// ============ POST /ingest ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    document_id: String,
    file_path: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    success: bool,
    chunk_count: usize,
}

async fn handle_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<serde_json::Value>,
) -> Result<Json<IngestResponse>, AppError> {
    let user = authenticate(&state, &headers).await?;
    let req: IngestRequest =
        serde_json::from_value(params).map_err(|e| bad_request(e.to_string()))?;

    let doc = ingest::fetch_document(&state.pool, &req.document_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("document not found: {}", req.document_id)))?;

    if doc.uploaded_by != user.id && !user.role.is_admin() {
        return Err(forbidden("only the uploader or an admin may process this document"));
    }

    let chunk_count = ingest::process_document(
        &state.config,
        &state.pool,
        &state.store,
        state.embedder.as_deref(),
        &req.document_id,
        &req.file_path,
        &req.mime_type,
    )
    .await
    .map_err(internal)?;

    Ok(Json(IngestResponse {
        success: true,
        chunk_count,
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    #[serde(default)]
    conversation_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let user = authenticate(&state, &headers).await?;
    let req: ChatRequest =
        serde_json::from_value(params).map_err(|e| bad_request(e.to_string()))?;

    auth::validate_chat_request(&req.messages, &state.config.limits).map_err(bad_request)?;

    // Calling-layer persistence: conversation created lazily on the first
    // user turn, user message saved before the orchestrator runs.
    let conversation_id = req
        .conversation_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ensure_conversation(&state.pool, &conversation_id, &user.id)
        .await
        .map_err(internal)?;
    if let Some(last) = req.messages.last() {
        if last.role == "user" {
            save_message(&state.pool, &conversation_id, "user", &last.content, None)
                .await
                .map_err(internal)?;
        }
    }

    let chat = chat::stream_chat(&state.config, &state.pool, user.role, &req.messages)
        .await
        .map_err(map_chat_error)?;

    let sources = chat.sources.clone();
    let stream = forward_and_persist(chat.frames, state.pool.clone(), conversation_id, sources);

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// State threaded through the caller-facing stream: the frames are forwarded
/// untouched while the reader accumulates the assistant's final text for
/// persistence after the stream completes.
struct ForwardState {
    frames: mpsc::Receiver<Vec<u8>>,
    reader: ChatStreamReader,
    text: String,
    persist: Option<(SqlitePool, String, Vec<Source>)>,
}

fn forward_and_persist(
    frames: mpsc::Receiver<Vec<u8>>,
    pool: SqlitePool,
    conversation_id: String,
    sources: Vec<Source>,
) -> impl Stream<Item = Result<Vec<u8>, Infallible>> {
    futures::stream::unfold(
        ForwardState {
            frames,
            reader: ChatStreamReader::new(),
            text: String::new(),
            persist: Some((pool, conversation_id, sources)),
        },
        |mut st| async move {
            match st.frames.next().await {
                Some(bytes) => {
                    for event in st.reader.push(&bytes) {
                        if let StreamEvent::Delta(delta) = event {
                            st.text.push_str(&delta);
                        }
                    }
                    Some((Ok(bytes), st))
                }
                None => {
                    // Persist only a completed answer; a close without the
                    // terminal marker is a failed response.
                    if st.reader.is_done() {
                        if let Some((pool, conversation_id, sources)) = st.persist.take() {
                            let text = std::mem::take(&mut st.text);
                            tokio::spawn(async move {
                                let sources_json = serde_json::to_string(&sources).ok();
                                if let Err(e) = save_message(
                                    &pool,
                                    &conversation_id,
                                    "assistant",
                                    &text,
                                    sources_json.as_deref(),
                                )
                                .await
                                {
                                    eprintln!(
                                        "Warning: failed to persist assistant message: {}",
                                        e
                                    );
                                }
                            });
                        }
                    }
                    None
                }
            }
        },
    )
}

async fn ensure_conversation(
    pool: &SqlitePool,
    conversation_id: &str,
    user_id: &str,
) -> anyhow::Result<()> {
    sqlx::query("INSERT OR IGNORE INTO conversations (id, user_id, created_at) VALUES (?, ?, ?)")
        .bind(conversation_id)
        .bind(user_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    Ok(())
}

async fn save_message(
    pool: &SqlitePool,
    conversation_id: &str,
    role: &str,
    content: &str,
    sources_json: Option<&str>,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO messages (id, conversation_id, role, content, sources_json, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(conversation_id)
    .bind(role)
    .bind(content)
    .bind(sources_json)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}
