//! HTTP server.
//!
//! A thin JSON boundary over [`Engine`]. Handlers decode the request, run
//! the engine call on the blocking pool, and encode the outcome.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/status` | Index lifecycle status |
//! | `POST` | `/initialize` | Build the index for a root directory |
//! | `GET`  | `/sentence-models` | Embedding models selectable at initialization |
//! | `POST` | `/search` | Semantic search over the current index |
//! | `POST` | `/summarize` | Summarize a file, or chat when only `message` is given |
//! | `POST` | `/test-connection` | Check that a language model server serves a model |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request`, `invalid_root` | 400 |
//! | `not_ready`, `build_in_progress` | 409 |
//! | `extraction_failed` | 422 |
//! | `internal` | 500 |
//! | `llm_unavailable` | 502 |
//! | `model_unavailable` | 503 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from another origin.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::LOCAL_MODEL_NAMES;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::models::{IndexStatus, SearchResult};

const DEFAULT_NUM_RESULTS: i64 = 10;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    engine: Arc<Engine>,
}

/// Starts the HTTP server on `[server].bind` with providers built from `config`.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let engine = Arc::new(Engine::from_config(config)?);
    serve(engine, &config.server.bind).await
}

/// Serves `engine` on `bind_addr`.
pub async fn serve(engine: Arc<Engine>, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Builds the application router.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/status", get(handle_status))
        .route("/initialize", post(handle_initialize))
        .route("/sentence-models", get(handle_sentence_models))
        .route("/search", post(handle_search))
        .route("/summarize", post(handle_summarize))
        .route("/test-connection", post(handle_test_connection))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_ready"`).
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

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        let code = err.code();
        let status = match code {
            "bad_request" | "invalid_root" => StatusCode::BAD_REQUEST,
            "not_ready" | "build_in_progress" => StatusCode::CONFLICT,
            "extraction_failed" => StatusCode::UNPROCESSABLE_ENTITY,
            "llm_unavailable" => StatusCode::BAD_GATEWAY,
            "model_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(code, error = %err, "request failed");
        }
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
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

/// Runs a synchronous engine call on the blocking pool.
async fn run_blocking<T, F>(engine: &Arc<Engine>, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&Engine) -> Result<T, EngineError> + Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || f(engine.as_ref()))
        .await
        .map_err(|e| internal(format!("engine task failed: {}", e)))?
        .map_err(AppError::from)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /status ============

async fn handle_status(State(state): State<AppState>) -> Json<IndexStatus> {
    Json(state.engine.status())
}

// ============ POST /initialize ============

#[derive(Deserialize)]
struct InitializeRequest {
    root_dir: PathBuf,
    #[serde(default)]
    ollama_url: Option<String>,
    #[serde(default)]
    ollama_model: Option<String>,
    /// Embedding model for this build; the configured model when absent.
    #[serde(default)]
    sentence_model: Option<String>,
    /// Check the language model before building.
    #[serde(default = "default_verify_llm", alias = "enable_ai_summary")]
    verify_llm: bool,
}

fn default_verify_llm() -> bool {
    true
}

/// Handler for `POST /initialize`.
///
/// The language model is checked first unless `verify_llm` is `false`. The
/// supplied LLM settings become the defaults for later requests. Returns
/// `409` if another build is running.
async fn handle_initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializeRequest>,
) -> Result<Json<IndexStatus>, AppError> {
    let status = run_blocking(&state.engine, move |engine| {
        let target = engine.llm_target(req.ollama_url.as_deref(), req.ollama_model.as_deref());
        if req.verify_llm {
            engine.test_connection(&target)?;
        }
        engine.set_llm_target(target);
        engine.initialize_with_model(&req.root_dir, req.sentence_model.as_deref())
    })
    .await?;
    Ok(Json(status))
}

// ============ GET /sentence-models ============

#[derive(Serialize)]
struct SentenceModelsResponse {
    /// Model used when `sentence_model` is omitted.
    default: String,
    models: Vec<String>,
}

async fn handle_sentence_models(State(state): State<AppState>) -> Json<SentenceModelsResponse> {
    Json(SentenceModelsResponse {
        default: state.engine.default_embedding_model().to_string(),
        models: LOCAL_MODEL_NAMES.iter().map(|m| m.to_string()).collect(),
    })
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    num_results: Option<i64>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let num_results = req.num_results.unwrap_or(DEFAULT_NUM_RESULTS);
    let results = run_blocking(&state.engine, move |engine| {
        engine.search(&req.query, num_results)
    })
    .await?;
    Ok(Json(SearchResponse { results }))
}

// ============ POST /summarize ============

#[derive(Deserialize)]
struct SummarizeRequest {
    #[serde(default)]
    file_path: Option<PathBuf>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    ollama_url: Option<String>,
    #[serde(default)]
    ollama_model: Option<String>,
}

#[derive(Serialize)]
struct SummarizeResponse {
    summary: String,
}

/// Handler for `POST /summarize`.
///
/// A `message` without a `file_path` is a chat turn; otherwise the file is
/// summarized.
async fn handle_summarize(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<SummarizeResponse>, AppError> {
    if req.file_path.is_none() && req.message.is_none() {
        return Err(bad_request("either file_path or message is required"));
    }
    let summary = run_blocking(&state.engine, move |engine| {
        let target = engine.llm_target(req.ollama_url.as_deref(), req.ollama_model.as_deref());
        match (req.file_path, req.message) {
            (Some(path), _) => engine.summarize(&path, &target),
            (None, Some(message)) => engine.chat(&message, &target),
            (None, None) => Err(EngineError::invalid_argument(
                "either file_path or message is required",
            )),
        }
    })
    .await?;
    Ok(Json(SummarizeResponse { summary }))
}

// ============ POST /test-connection ============

#[derive(Deserialize)]
struct TestConnectionRequest {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct TestConnectionResponse {
    status: String,
    message: String,
}

async fn handle_test_connection(
    State(state): State<AppState>,
    Json(req): Json<TestConnectionRequest>,
) -> Result<Json<TestConnectionResponse>, AppError> {
    let message = run_blocking(&state.engine, move |engine| {
        let target = engine.llm_target(req.url.as_deref(), req.model.as_deref());
        engine.test_connection(&target)?;
        Ok(format!(
            "Connection successful! Model {} is available at {}.",
            target.model, target.server_url
        ))
    })
    .await?;
    Ok(Json(TestConnectionResponse {
        status: "success".to_string(),
        message,
    }))
}
