//! HTTP transport over the FAQ engine.
//!
//! - `GET /` - health, 500 while the engine failed to start
//! - `POST /chat` - `{ "user_message": .. }` -> `{ "response": .. }`
//! - `GET /random_questions?count=N` - `{ "questions": [..] }`

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use faqbot_core::{make_provider, EngineConfig, FaqEngine, ServerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Whether startup produced an engine. A failed start still serves, so
/// callers get an explicit 500 instead of a dead socket.
#[derive(Clone)]
pub enum EngineStatus {
    Ready(Arc<FaqEngine>),
    Failed(String),
}

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineStatus,
    pub settings: ServerConfig,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("chatbot core not initialized: {0}")]
    NotInitialized(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotInitialized(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotInitialized(_) => "NOT_INITIALIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.error_code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(err: QueryRejection) -> Self {
        ApiError::BadRequest(err.body_text())
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

impl AppState {
    fn engine(&self) -> ApiResult<&Arc<FaqEngine>> {
        match &self.engine {
            EngineStatus::Ready(engine) => Ok(engine),
            EngineStatus::Failed(reason) => Err(ApiError::NotInitialized(reason.clone())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub user_message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Deserialize)]
pub struct SampleParams {
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QuestionsResponse {
    pub questions: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: String,
    pub entries: usize,
    pub model: String,
}

async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let engine = state.engine()?;
    Ok(Json(HealthResponse {
        status: "ok",
        message: "Chatbot API is running and core is initialized!".to_string(),
        entries: engine.len(),
        model: engine.model_id().to_string(),
    }))
}

async fn chat(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<ChatResponse>> {
    let engine = Arc::clone(state.engine()?);
    let Json(request) = payload?;
    let timeout = Duration::from_millis(state.settings.request_timeout_ms);

    let worker = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.respond(&request.user_message))
    };

    let response = match tokio::time::timeout(timeout, worker).await {
        Ok(Ok(text)) => text,
        Ok(Err(err)) => {
            error!(error = %err, "respond task failed");
            engine.messages().unavailable.clone()
        }
        Err(_) => {
            warn!(timeout_ms = state.settings.request_timeout_ms, "respond timed out");
            engine.messages().unavailable.clone()
        }
    };

    Ok(Json(ChatResponse { response }))
}

async fn random_questions(
    State(state): State<AppState>,
    params: std::result::Result<Query<SampleParams>, QueryRejection>,
) -> ApiResult<Json<QuestionsResponse>> {
    let engine = state.engine()?;
    let Query(params) = params?;
    let count = params
        .count
        .unwrap_or(state.settings.default_sample_count);

    Ok(Json(QuestionsResponse {
        questions: engine.sample_questions(count),
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);

    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .route("/random_questions", get(random_questions))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Build the engine off the async runtime. A failure is logged and kept so
/// the API can report it.
async fn start_engine(config: EngineConfig) -> EngineStatus {
    let started = tokio::task::spawn_blocking(move || {
        let provider = make_provider(&config.model)?;
        Ok::<_, anyhow::Error>(FaqEngine::init(&config, provider)?)
    })
    .await;

    match started {
        Ok(Ok(engine)) => {
            info!(entries = engine.len(), model = engine.model_id(), "FAQ engine ready");
            EngineStatus::Ready(Arc::new(engine))
        }
        Ok(Err(err)) => {
            let reason = format!("{err:#}");
            error!(%reason, "failed to initialize FAQ engine");
            EngineStatus::Failed(reason)
        }
        Err(err) => {
            error!(error = %err, "engine startup task failed");
            EngineStatus::Failed(err.to_string())
        }
    }
}

pub async fn serve(config: EngineConfig) -> Result<()> {
    let settings = config.server.clone();
    let engine = start_engine(config).await;
    let app = router(AppState {
        engine,
        settings: settings.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind)
        .await
        .with_context(|| format!("bind {}", settings.bind))?;
    info!("Starting FAQ API on {}", settings.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
