//! HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service info |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/api/upload` | Multipart `file` (PDF or image) → new session |
//! | `POST` | `/api/upload-json` | `{url}` or `{text}` → new session |
//! | `POST` | `/api/sessions` | Create an empty session |
//! | `GET`  | `/api/sessions` | List sessions |
//! | `POST` | `/api/query` | `{session_id, question}` → answer |
//! | `POST` | `/api/search-web` | `{question}` → web-only answer |
//! | `POST` | `/api/add-context` | Multipart `session_id` + `file` |
//! | `POST` | `/api/add-context-json` | `{session_id, url}` or `{session_id, text}` |
//! | `GET`  | `/api/sessions/{id}/summary` | Latest summary |
//! | `GET`  | `/api/sessions/{id}/info` | Sources and counts |
//! | `GET`  | `/api/sessions/{id}/history` | Chat turns |
//! | `DELETE` | `/api/sessions/{id}` | Delete a session |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "session_not_found", "message": "session not found: 42" } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `session_not_found` | 404 |
//! | `payload_too_large` | 413 |
//! | `unsupported_format` | 415 |
//! | `extraction_error` | 422 |
//! | `fetch_error`, `embedding_service_error`, `generation_error`, `search_service_error` | 502 |
//! | `internal` | 500 |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser front-ends
//! on other origins can call the API.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, Path,
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use docqa_core::models::{AnswerSource, ChatTurn, WebSnippet};
use docqa_core::prompt::Preview;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::answer::{Answer, Citation};
use crate::assistant::{Assistant, SessionInfo, SessionListing, SourceInfo};
use crate::config::Config;
use crate::error::RagError;
use crate::ingest::SourceInput;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant>,
}

/// Starts the HTTP server with providers built from `config`.
///
/// Runs until Ctrl-C. Fails if a provider cannot be created (for example
/// a missing API key) or the bind address is unavailable.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(Assistant::from_config(config)?);
    run_server_with_assistant(config, assistant).await
}

/// Starts the HTTP server around an existing [`Assistant`].
///
/// Used by tests and embedders that supply their own services.
pub async fn run_server_with_assistant(
    config: &Config,
    assistant: Arc<Assistant>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(assistant, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("docqa server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Build the router without binding.
pub fn router(assistant: Arc<Assistant>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/upload-json", post(handle_upload_json))
        .route("/api/sessions", post(handle_create_session).get(handle_list_sessions))
        .route("/api/query", post(handle_query))
        .route("/api/search-web", post(handle_search_web))
        .route("/api/add-context", post(handle_add_context))
        .route("/api/add-context-json", post(handle_add_context_json))
        .route("/api/sessions/{id}", axum::routing::delete(handle_delete_session))
        .route("/api/sessions/{id}/summary", get(handle_summary))
        .route("/api/sessions/{id}/info", get(handle_info))
        .route("/api/sessions/{id}/history", get(handle_history))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { assistant })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the task is dropped.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"session_not_found"`).
    code: String,
    /// Human-readable error message.
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

fn payload_too_large(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::PAYLOAD_TOO_LARGE,
        code: "payload_too_large".to_string(),
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RagError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            RagError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RagError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
            RagError::Fetch { .. }
            | RagError::EmbeddingService(_)
            | RagError::Generation(_)
            | RagError::SearchService(_) => StatusCode::BAD_GATEWAY,
            RagError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(code = err.code(), error = %err, "request failed");
        }
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            payload_too_large(rejection.body_text())
        } else {
            bad_request(rejection.body_text())
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            payload_too_large(err.body_text())
        } else {
            bad_request(err.body_text())
        }
    }
}

// ============ GET / and /health ============

#[derive(Serialize)]
struct RootResponse {
    service: &'static str,
    version: &'static str,
    message: &'static str,
}

async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        service: "docqa",
        version: env!("CARGO_PKG_VERSION"),
        message: "Document Q&A API is running",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"healthy"` when the server is running.
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "docqa",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ Uploads ============

#[derive(Serialize)]
struct UploadResponse {
    success: bool,
    session_id: String,
    summary: String,
    content_type: String,
    source: SourceInfo,
    chunk_count: usize,
}

/// JSON body carrying either a URL or raw text.
#[derive(Deserialize)]
struct ContentRequest {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl ContentRequest {
    fn into_input(self) -> Result<SourceInput, AppError> {
        let url = self.url.filter(|u| !u.trim().is_empty());
        let text = self.text.filter(|t| !t.trim().is_empty());
        match (url, text) {
            (Some(url), None) => Ok(SourceInput::Url(url)),
            (None, Some(text)) => Ok(SourceInput::Text(text)),
            (Some(_), Some(_)) => Err(bad_request("provide either url or text, not both")),
            (None, None) => Err(bad_request("either url or text must be provided")),
        }
    }
}

/// Multipart form fields used by the upload endpoints.
struct UploadForm {
    session_id: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        session_id: None,
        file: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await?;
                form.file = Some((file_name, bytes.to_vec()));
            }
            "session_id" => {
                form.session_id = Some(field.text().await?.trim().to_string());
            }
            _ => {}
        }
    }
    Ok(form)
}

fn file_input(form: &mut UploadForm) -> Result<SourceInput, AppError> {
    match form.file.take() {
        Some((name, _)) if name.is_empty() => Err(bad_request("no file selected")),
        Some((name, bytes)) => Ok(SourceInput::File { bytes, name }),
        None => Err(bad_request("missing 'file' field")),
    }
}

async fn upload(state: &AppState, input: SourceInput) -> Result<Json<UploadResponse>, AppError> {
    let outcome = state.assistant.upload(input).await?;
    Ok(Json(UploadResponse {
        success: true,
        session_id: outcome.session_id,
        summary: outcome.summary,
        content_type: outcome.source.kind.as_str().to_string(),
        source: outcome.source,
        chunk_count: outcome.chunk_count,
    }))
}

async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut form = read_form(multipart).await?;
    let input = file_input(&mut form)?;
    upload(&state, input).await
}

async fn handle_upload_json(
    State(state): State<AppState>,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(req) = payload?;
    upload(&state, req.into_input()?).await
}

// ============ Add context ============

#[derive(Serialize)]
struct AddedContent {
    #[serde(rename = "type")]
    content_type: String,
    name: String,
    preview: Preview,
}

#[derive(Serialize)]
struct AddContextResponse {
    success: bool,
    session_id: String,
    summary: String,
    added_content: AddedContent,
    chunk_count: usize,
}

async fn add_context(
    state: &AppState,
    session_id: &str,
    input: SourceInput,
) -> Result<Json<AddContextResponse>, AppError> {
    let outcome = state.assistant.add_context(session_id, input).await?;
    Ok(Json(AddContextResponse {
        success: true,
        session_id: outcome.session_id,
        summary: outcome.summary,
        added_content: AddedContent {
            content_type: outcome.source.kind.as_str().to_string(),
            name: outcome.source.name,
            preview: outcome.preview,
        },
        chunk_count: outcome.chunk_count,
    }))
}

async fn handle_add_context(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AddContextResponse>, AppError> {
    let mut form = read_form(multipart).await?;
    let session_id = form
        .session_id
        .take()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("missing 'session_id' field"))?;
    let input = file_input(&mut form)?;
    add_context(&state, &session_id, input).await
}

async fn handle_add_context_json(
    State(state): State<AppState>,
    payload: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<AddContextResponse>, AppError> {
    let Json(mut req) = payload?;
    let session_id = req
        .session_id
        .take()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| bad_request("session_id is required"))?;
    add_context(&state, &session_id, req.into_input()?).await
}

// ============ Questions ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    question: String,
}

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    question: String,
}

#[derive(Serialize)]
struct AnswerResponse {
    success: bool,
    answer: String,
    source: AnswerSource,
    not_found: bool,
    fell_back: bool,
    citations: Vec<Citation>,
    web_results: Vec<WebSnippet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<String>,
}

impl From<Answer> for AnswerResponse {
    fn from(a: Answer) -> Self {
        Self {
            success: true,
            answer: a.text,
            source: a.source,
            not_found: a.not_found,
            fell_back: a.fell_back,
            citations: a.citations,
            web_results: a.web_results,
            notice: a.notice,
        }
    }
}

async fn handle_query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(req) = payload?;
    if req.session_id.trim().is_empty() {
        return Err(bad_request("session_id is required"));
    }
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let answer = state.assistant.ask(req.session_id.trim(), &req.question).await?;
    Ok(Json(answer.into()))
}

async fn handle_search_web(
    State(state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<AnswerResponse>, AppError> {
    let Json(req) = payload?;
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    let answer = state.assistant.search_web(&req.question).await?;
    Ok(Json(answer.into()))
}

// ============ Sessions ============

#[derive(Serialize)]
struct CreatedResponse {
    success: bool,
    session_id: String,
}

async fn handle_create_session(State(state): State<AppState>) -> Json<CreatedResponse> {
    Json(CreatedResponse {
        success: true,
        session_id: state.assistant.create_session(),
    })
}

#[derive(Serialize)]
struct ListResponse {
    success: bool,
    count: usize,
    sessions: Vec<SessionListing>,
}

async fn handle_list_sessions(State(state): State<AppState>) -> Json<ListResponse> {
    let sessions = state.assistant.list().await;
    Json(ListResponse {
        success: true,
        count: sessions.len(),
        sessions,
    })
}

#[derive(Serialize)]
struct SummaryResponse {
    success: bool,
    session_id: String,
    summary: Option<String>,
}

async fn handle_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, AppError> {
    let summary = state.assistant.summary(&id).await?;
    Ok(Json(SummaryResponse {
        success: true,
        session_id: id,
        summary,
    }))
}

#[derive(Serialize)]
struct InfoResponse {
    success: bool,
    #[serde(flatten)]
    info: SessionInfo,
}

async fn handle_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InfoResponse>, AppError> {
    let info = state.assistant.info(&id).await?;
    Ok(Json(InfoResponse {
        success: true,
        info,
    }))
}

#[derive(Serialize)]
struct HistoryResponse {
    success: bool,
    session_id: String,
    history: Vec<ChatTurn>,
}

async fn handle_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let history = state.assistant.history(&id).await?;
    Ok(Json(HistoryResponse {
        success: true,
        session_id: id,
        history,
    }))
}

#[derive(Serialize)]
struct DeleteResponse {
    success: bool,
    message: String,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.assistant.delete(&id)?;
    Ok(Json(DeleteResponse {
        success: true,
        message: format!("Session {} deleted", id),
    }))
}
