//! HTTP server exposing the document, search, and chat boundaries.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/documents` | Ingest one document (base64 bytes or inline text) |
//! | `POST` | `/documents/batch` | Ingest many; per-file results |
//! | `DELETE` | `/documents/{id}` | Delete a document and its chunks |
//! | `GET` | `/documents/stats` | Corpus statistics |
//! | `GET` | `/documents/formats` | Supported formats and size limit |
//! | `POST` | `/search` | Search with mode/limit/alpha |
//! | `GET` | `/search` | Query-string search variant |
//! | `POST` | `/search/lexical` | BM25-only search |
//! | `POST` | `/search/hybrid` | Hybrid search, alpha as query param |
//! | `POST` | `/chat` | Retrieval-augmented chat turn |
//! | `POST` | `/chat/summarize` | Summarize a session |
//! | `POST` | `/chat/feedback` | Attach feedback to a message |
//! | `GET` | `/chat/sessions` | List sessions |
//! | `GET` | `/chat/sessions/{id}/history` | Full session history |
//! | `POST` | `/chat/sessions/{id}/clear` | Clear history, keep the id |
//! | `DELETE` | `/chat/sessions/{id}` | Delete the session |
//! | `GET` | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "document not found: …" } }
//! ```
//!
//! Codes: `bad_request` (400), `not_found` (404), `conflict` (409),
//! `unsupported_format` (415), `corrupt_file` (422),
//! `service_unavailable` (503), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser
//! front ends.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use ragline_core::error::RagError;
use ragline_core::models::{Feedback, RetrievalResult, SourceAttribution};
use ragline_core::pipeline::AnswerRequest;
use ragline_core::search::SearchMode;

use crate::engine::{IngestRequest, RagEngine};
use crate::extract;

/// Start the HTTP server on the configured bind address. Runs until the
/// process terminates.
pub async fn run_server(engine: Arc<RagEngine>) -> anyhow::Result<()> {
    let bind_addr = engine.config().server.bind.clone();

    if let Some(ttl_secs) = engine.config().session.idle_ttl_secs {
        spawn_session_expiry(engine.clone(), ttl_secs);
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/documents", post(handle_ingest))
        .route("/documents/batch", post(handle_ingest_batch))
        .route("/documents/{id}", delete(handle_delete_document))
        .route("/documents/stats", get(handle_stats))
        .route("/documents/formats", get(handle_formats))
        .route("/search", post(handle_search).get(handle_search_get))
        .route("/search/lexical", post(handle_search_lexical))
        .route("/search/hybrid", post(handle_search_hybrid))
        .route("/chat", post(handle_chat))
        .route("/chat/summarize", post(handle_summarize))
        .route("/chat/feedback", post(handle_feedback))
        .route("/chat/sessions", get(handle_list_sessions))
        .route("/chat/sessions/{id}/history", get(handle_history))
        .route("/chat/sessions/{id}/clear", post(handle_clear_session))
        .route("/chat/sessions/{id}", delete(handle_delete_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(engine);

    tracing::info!(bind = %bind_addr, "server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop sessions idle longer than the configured TTL.
fn spawn_session_expiry(engine: Arc<RagEngine>, ttl_secs: u64) {
    let interval = std::time::Duration::from_secs(ttl_secs.clamp(1, 300));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let expired = engine
                .sessions()
                .expire_idle(chrono::Duration::seconds(ttl_secs as i64));
            if expired > 0 {
                tracing::info!(expired, "expired idle sessions");
            }
        }
    });
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

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let (status, code) = match &err {
            RagError::Configuration(_) | RagError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            RagError::DuplicateDocument(_) => (StatusCode::CONFLICT, "conflict"),
            RagError::UnsupportedFormat(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
            }
            RagError::CorruptFile { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "corrupt_file"),
            RagError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            RagError::EmbeddingUnavailable(_) | RagError::GenerationUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            RagError::DimensionMismatch { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code,
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

// ============ Documents ============

#[derive(Deserialize)]
struct IngestBody {
    filename: String,
    /// Base64-encoded file bytes (binary formats).
    content_base64: Option<String>,
    /// Inline text content (plain text formats).
    text: Option<String>,
    mime_type: Option<String>,
    document_id: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    replace: bool,
}

impl IngestBody {
    fn into_request(self) -> Result<IngestRequest, AppError> {
        let bytes = match (self.content_base64, self.text) {
            (Some(b64), _) => base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| bad_request(format!("invalid base64 content: {}", e)))?,
            (None, Some(text)) => text.into_bytes(),
            (None, None) => {
                return Err(bad_request(
                    "one of content_base64 or text must be provided",
                ))
            }
        };
        Ok(IngestRequest {
            filename: self.filename,
            bytes,
            mime_type: self.mime_type,
            document_id: self.document_id,
            metadata: self.metadata,
            replace: self.replace,
        })
    }
}

#[derive(Serialize)]
struct IngestResponse {
    document_id: String,
    filename: String,
    status: String,
    chunk_count: usize,
    message: String,
}

async fn handle_ingest(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<IngestBody>,
) -> Result<Json<IngestResponse>, AppError> {
    let receipt = engine.ingest(body.into_request()?).await?;
    Ok(Json(IngestResponse {
        message: format!(
            "Document processed successfully. {} chunks indexed.",
            receipt.chunk_count
        ),
        document_id: receipt.document_id,
        filename: receipt.filename,
        status: "success".to_string(),
        chunk_count: receipt.chunk_count,
    }))
}

#[derive(Deserialize)]
struct BatchIngestBody {
    documents: Vec<IngestBody>,
}

#[derive(Serialize)]
struct BatchItemResult {
    filename: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_count: Option<usize>,
    message: String,
}

#[derive(Serialize)]
struct BatchIngestResponse {
    results: Vec<BatchItemResult>,
}

async fn handle_ingest_batch(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<BatchIngestBody>,
) -> Result<Json<BatchIngestResponse>, AppError> {
    let mut requests = Vec::with_capacity(body.documents.len());
    let mut results = Vec::new();

    for doc in body.documents {
        let filename = doc.filename.clone();
        match doc.into_request() {
            Ok(req) => requests.push(req),
            Err(e) => results.push(BatchItemResult {
                filename,
                status: "error".to_string(),
                document_id: None,
                chunk_count: None,
                message: e.message,
            }),
        }
    }

    for (filename, outcome) in engine.ingest_batch(requests).await {
        match outcome {
            Ok(receipt) => results.push(BatchItemResult {
                filename,
                status: "success".to_string(),
                message: format!("{} chunks indexed", receipt.chunk_count),
                document_id: Some(receipt.document_id),
                chunk_count: Some(receipt.chunk_count),
            }),
            Err(e) => results.push(BatchItemResult {
                filename,
                status: "error".to_string(),
                document_id: None,
                chunk_count: None,
                message: e.to_string(),
            }),
        }
    }

    Ok(Json(BatchIngestResponse { results }))
}

#[derive(Serialize)]
struct DeleteResponse {
    status: String,
    message: String,
}

async fn handle_delete_document(
    State(engine): State<Arc<RagEngine>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let removed = engine.delete_document(&id)?;
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Document {} deleted ({} chunks removed)", id, removed),
    }))
}

async fn handle_stats(
    State(engine): State<Arc<RagEngine>>,
) -> Json<ragline_core::models::IndexStats> {
    Json(engine.stats())
}

#[derive(Serialize)]
struct FormatsResponse {
    supported_formats: Vec<String>,
    max_file_size_mb: u64,
}

async fn handle_formats(State(engine): State<Arc<RagEngine>>) -> Json<FormatsResponse> {
    Json(FormatsResponse {
        supported_formats: extract::supported_extensions()
            .iter()
            .map(|s| s.to_string())
            .collect(),
        max_file_size_mb: engine.config().ingest.max_file_size_mb,
    })
}

// ============ Search ============

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    limit: Option<usize>,
    /// `lexical`, `vector`, or `hybrid` (default).
    mode: Option<String>,
    alpha: Option<f64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<RetrievalResult>,
    total_results: usize,
    query: String,
}

async fn run_search(
    engine: &RagEngine,
    query: String,
    limit: Option<usize>,
    mode: SearchMode,
) -> Result<Json<SearchResponse>, AppError> {
    let results = engine.search(&query, limit, mode).await?;
    Ok(Json(SearchResponse {
        total_results: results.len(),
        results,
        query,
    }))
}

async fn handle_search(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let mode = SearchMode::parse(
        body.mode.as_deref().unwrap_or("hybrid"),
        body.alpha,
        engine.default_alpha(),
    )?;
    run_search(&engine, body.query, body.limit, mode).await
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
    mode: Option<String>,
    alpha: Option<f64>,
}

async fn handle_search_get(
    State(engine): State<Arc<RagEngine>>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let mode = SearchMode::parse(
        params.mode.as_deref().unwrap_or("hybrid"),
        params.alpha,
        engine.default_alpha(),
    )?;
    run_search(&engine, params.q, params.limit, mode).await
}

async fn handle_search_lexical(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    run_search(&engine, body.query, body.limit, SearchMode::Lexical).await
}

#[derive(Deserialize)]
struct AlphaParam {
    alpha: Option<f64>,
}

async fn handle_search_hybrid(
    State(engine): State<Arc<RagEngine>>,
    Query(param): Query<AlphaParam>,
    Json(body): Json<SearchBody>,
) -> Result<Json<SearchResponse>, AppError> {
    let alpha = param
        .alpha
        .or(body.alpha)
        .unwrap_or_else(|| engine.default_alpha());
    let mode = SearchMode::Hybrid { alpha };
    run_search(&engine, body.query, body.limit, mode).await
}

// ============ Chat ============

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    session_id: Option<String>,
    #[serde(default = "default_use_history")]
    use_history: bool,
    limit: Option<usize>,
    mode: Option<String>,
    alpha: Option<f64>,
}

fn default_use_history() -> bool {
    true
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    sources: Vec<SourceAttribution>,
    session_id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn handle_chat(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, AppError> {
    if body.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let mode = match body.mode.as_deref() {
        Some(m) => Some(SearchMode::parse(m, body.alpha, engine.default_alpha())?),
        None => body.alpha.map(|alpha| SearchMode::Hybrid { alpha }),
    };
    if let Some(m) = &mode {
        m.validate()?;
    }

    let answer = engine
        .chat(AnswerRequest {
            query: body.message,
            session_id: body.session_id,
            use_history: body.use_history,
            limit: body.limit,
            mode,
        })
        .await?;

    Ok(Json(ChatResponse {
        response: answer.response,
        sources: answer.sources,
        session_id: answer.session_id,
        timestamp: chrono::Utc::now(),
    }))
}

#[derive(Deserialize)]
struct SummarizeBody {
    session_id: String,
}

#[derive(Serialize)]
struct SummarizeResponse {
    session_id: String,
    summary: String,
    message_count: usize,
}

async fn handle_summarize(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<SummarizeBody>,
) -> Result<Json<SummarizeResponse>, AppError> {
    let summary = engine.summarize(&body.session_id).await?;
    let message_count = engine.sessions().history(&body.session_id, true).len();
    Ok(Json(SummarizeResponse {
        session_id: body.session_id,
        summary,
        message_count,
    }))
}

#[derive(Deserialize)]
struct FeedbackBody {
    session_id: String,
    message_index: usize,
    rating: u8,
    comment: Option<String>,
}

#[derive(Serialize)]
struct FeedbackResponse {
    status: String,
    session_id: String,
    message_index: usize,
    rating: u8,
}

async fn handle_feedback(
    State(engine): State<Arc<RagEngine>>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<FeedbackResponse>, AppError> {
    engine.sessions().attach_feedback(
        &body.session_id,
        body.message_index,
        Feedback {
            rating: body.rating,
            comment: body.comment,
        },
    )?;
    Ok(Json(FeedbackResponse {
        status: "success".to_string(),
        session_id: body.session_id,
        message_index: body.message_index,
        rating: body.rating,
    }))
}

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<ragline_core::models::SessionSummary>,
    total_sessions: usize,
}

async fn handle_list_sessions(State(engine): State<Arc<RagEngine>>) -> Json<SessionListResponse> {
    let sessions = engine.sessions().list();
    Json(SessionListResponse {
        total_sessions: sessions.len(),
        sessions,
    })
}

#[derive(Serialize)]
struct HistoryResponse {
    session_id: String,
    messages: Vec<ragline_core::models::Message>,
    total_messages: usize,
}

async fn handle_history(
    State(engine): State<Arc<RagEngine>>,
    Path(id): Path<String>,
) -> Json<HistoryResponse> {
    let messages = engine.sessions().history(&id, true);
    Json(HistoryResponse {
        session_id: id,
        total_messages: messages.len(),
        messages,
    })
}

async fn handle_clear_session(
    State(engine): State<Arc<RagEngine>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    engine.sessions().clear(&id)?;
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Session {} cleared", id),
    }))
}

async fn handle_delete_session(
    State(engine): State<Arc<RagEngine>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    engine.sessions().delete(&id)?;
    Ok(Json(DeleteResponse {
        status: "success".to_string(),
        message: format!("Session {} deleted", id),
    }))
}

// ============ Health ============

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
