//! JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Liveness plus chunk count |
//! | `GET`  | `/info` | Index and provider summary |
//! | `POST` | `/query` | Similarity search |
//! | `POST` | `/content` | Embed and store one chunk |
//! | `POST` | `/chat` | Retrieval-augmented chat turn |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "top_k must be in [1, 100], got 0" } }
//! ```
//!
//! | Code | Status | Raised for |
//! |------|--------|------------|
//! | `bad_request` | 400 | invalid parameters, dimension mismatch |
//! | `provider_error` | 502 | embedding, generation or rerank failure |
//! | `timeout` | 504 | a provider call exceeded its timeout |
//! | `internal` | 500 | storage failures |
//!
//! Provider errors carry `"retryable": true`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rag_engine_core::chat::ChatRequest;
use rag_engine_core::models::{ConversationTurn, Metadata, RetrievalResult};
use rag_engine_core::{Metric, RagError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::engine::{AddChunk, Engine, EngineInfo, Health, Query};

/// Characters of chunk content echoed back by `POST /chat`.
pub const CHAT_PREVIEW_CHARS: usize = 200;

/// Open the engine and serve until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::open(config).await?);
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "rag-engine listening");
    println!("RAG server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the application router around a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .route("/query", post(handle_query))
        .route("/content", post(handle_content))
        .route("/chat", post(handle_chat))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(engine)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    retryable: bool,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                retryable: self.retryable,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
        retryable: false,
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let retryable = err.is_retryable();
        let (status, code) = match &err {
            RagError::InvalidParameter(_) | RagError::DimensionMismatch { .. } => {
                (StatusCode::BAD_REQUEST, "bad_request")
            }
            RagError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RagError::EmbeddingFailed(_)
            | RagError::GenerationFailed(_)
            | RagError::RerankFailed(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            RagError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            error!(%err, "request failed");
        }
        AppError {
            status,
            code,
            message: err.to_string(),
            retryable,
        }
    }
}

fn parse_metric(search_type: Option<&str>) -> Result<Metric, AppError> {
    match search_type {
        None => Ok(Metric::default()),
        Some(s) => s.parse().map_err(|e: RagError| bad_request(e.to_string())),
    }
}

// ============ GET /health, GET /info ============

async fn handle_health(State(engine): State<Arc<Engine>>) -> Result<Json<Health>, AppError> {
    Ok(Json(engine.health().await?))
}

async fn handle_info(State(engine): State<Arc<Engine>>) -> Result<Json<EngineInfo>, AppError> {
    Ok(Json(engine.info().await?))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    search_type: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
    #[serde(default)]
    metadata_filter: Option<Metadata>,
}

#[derive(Serialize)]
struct QueryChunk {
    id: u64,
    content: String,
    /// JSON-encoded metadata object.
    metadata: String,
    document_id: String,
    chunk_index: i64,
    similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    rerank_score: Option<f64>,
}

impl From<RetrievalResult> for QueryChunk {
    fn from(hit: RetrievalResult) -> Self {
        Self {
            id: hit.chunk_id,
            metadata: serde_json::Value::Object(hit.metadata).to_string(),
            content: hit.content,
            document_id: hit.document_id,
            chunk_index: hit.chunk_index,
            similarity: hit.score,
            rerank_score: hit.rerank_score,
        }
    }
}

#[derive(Serialize)]
struct QueryResponse {
    query: String,
    chunks: Vec<QueryChunk>,
    search_type: Metric,
    top_k: usize,
}

async fn handle_query(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let metric = parse_metric(req.search_type.as_deref())?;
    let top_k = req.top_k.unwrap_or_else(|| engine.default_top_k());

    let query = Query {
        text: req.query,
        metric,
        top_k,
        threshold: req.threshold,
        metadata_filter: req.metadata_filter,
    };
    let hits = engine.query(&query).await?;

    Ok(Json(QueryResponse {
        query: query.text,
        chunks: hits.into_iter().map(QueryChunk::from).collect(),
        search_type: metric,
        top_k,
    }))
}

// ============ POST /content ============

#[derive(Deserialize)]
struct ContentRequest {
    content: String,
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    document_id: Option<String>,
    #[serde(default)]
    chunk_index: Option<i64>,
}

#[derive(Serialize)]
struct ContentResponse {
    chunk_id: u64,
    content: String,
    document_id: String,
    chunk_index: i64,
    message: &'static str,
}

async fn handle_content(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ContentRequest>,
) -> Result<Json<ContentResponse>, AppError> {
    let added = engine
        .add_chunk(AddChunk {
            content: req.content.clone(),
            metadata: req.metadata.unwrap_or_default(),
            document_id: req.document_id,
            chunk_index: req.chunk_index,
        })
        .await?;

    Ok(Json(ContentResponse {
        chunk_id: added.chunk_id,
        content: req.content,
        document_id: added.document_id,
        chunk_index: added.chunk_index,
        message: "Content added successfully",
    }))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatBody {
    message: String,
    #[serde(default)]
    conversation_history: Option<Vec<ConversationTurn>>,
    #[serde(default)]
    search_type: Option<String>,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    temperature: Option<f32>,
    #[serde(default)]
    system_prompt: Option<String>,
}

#[derive(Serialize)]
struct ContextChunk {
    chunk_id: u64,
    content: String,
    similarity: f64,
}

#[derive(Serialize)]
struct ChatBodyResponse {
    response: String,
    user_message: String,
    context_used: usize,
    context_chunks: Vec<ContextChunk>,
    model: String,
}

fn preview(content: &str) -> String {
    match content.char_indices().nth(CHAT_PREVIEW_CHARS) {
        Some((end, _)) => format!("{}...", &content[..end]),
        None => content.to_string(),
    }
}

async fn handle_chat(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatBodyResponse>, AppError> {
    let mut req = ChatRequest::new(body.message);
    req.history = body.conversation_history.unwrap_or_default();
    req.metric = parse_metric(body.search_type.as_deref())?;
    if let Some(top_k) = body.top_k {
        req.top_k = top_k;
    }
    if let Some(temperature) = body.temperature {
        req.temperature = temperature;
    }
    req.system_prompt = body.system_prompt;

    let result = engine.chat(req).await?;

    Ok(Json(ChatBodyResponse {
        response: result.response,
        user_message: result.user_message,
        context_used: result.context_used,
        context_chunks: result
            .chunks_used
            .iter()
            .map(|c| ContextChunk {
                chunk_id: c.chunk_id,
                content: preview(&c.content),
                similarity: c.score,
            })
            .collect(),
        model: result.model,
    }))
}
