//! HTTP server for the StudyPack API.
//!
//! Exposes study pack generation and usage queries. Callers are keyed by
//! peer address. With `server.trust_proxy_headers` set, an upstream gateway
//! may name the caller through `x-user-id` or `x-forwarded-for` instead.

use crate::config::Config;
use crate::model::{
    ActorKey, ApiError, HealthResponse, StudyPackRequest, StudyPackResult, UsageSnapshot,
};
use crate::study::{StudyPackError, StudyPackGenerator};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};
use utoipa::OpenApi;

/// Header carrying a gateway-authenticated user id
pub const USER_ID_HEADER: &str = "x-user-id";

const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// OpenAPI documentation for the StudyPack API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "StudyPack API",
        version = "0.1.0",
        description = "Turns study notes into a summary, key points and flashcards, \
                       with per-caller rate limiting and a daily generation quota.",
        license(name = "MIT"),
        contact(name = "StudyPack Contributors")
    ),
    servers(
        (url = "http://127.0.0.1:11436", description = "Local development server")
    ),
    paths(health_check, get_usage, generate_study_pack),
    components(schemas(
        crate::model::GenerationMode,
        crate::model::StudyPackRequest,
        crate::model::StudyPackResult,
        crate::model::UsageSnapshot,
        crate::model::HealthResponse,
        crate::model::ApiError,
        crate::model::ApiErrorDetail,
    )),
    tags(
        (name = "Study", description = "Study pack generation"),
        (name = "Usage", description = "Daily quota"),
        (name = "Health", description = "Server health and status")
    )
)]
pub struct ApiDoc;

/// Shared application state
pub struct AppState {
    pub generator: StudyPackGenerator,
    pub config: Config,
}

impl AppState {
    pub fn new(generator: StudyPackGenerator, config: Config) -> Self {
        Self { generator, config }
    }
}

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/study-pack", post(generate_study_pack))
        .route("/v1/usage", get(get_usage))
        .route("/health", get(health_check))
        .route("/openapi.json", get(openapi_json))
        .route("/", get(root))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Resolve the caller.
///
/// Identity headers are client-controlled, so they are only read when
/// `trust_proxy_headers` is set; otherwise the peer address is the key.
pub fn resolve_actor(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_proxy_headers: bool,
) -> ActorKey {
    let peer_ip = peer.map(|addr| addr.ip().to_string());

    if !trust_proxy_headers {
        return ActorKey::resolve(None, peer_ip.as_deref());
    }

    let user_id = headers.get(USER_ID_HEADER).and_then(|v| v.to_str().ok());
    let forwarded = headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    ActorKey::resolve(user_id, forwarded.or(peer_ip).as_deref())
}

fn request_actor(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> ActorKey {
    resolve_actor(
        headers,
        peer.map(|ConnectInfo(addr)| addr),
        state.config.server.trust_proxy_headers,
    )
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "studypack",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "generate": "POST /v1/study-pack",
            "usage": "GET /v1/usage",
            "health": "GET /health",
            "openapi": "GET /openapi.json"
        }
    }))
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Server health status", body = HealthResponse)
    )
)]
#[instrument(skip_all)]
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let completion_available = state.generator.client().check_available().await;

    Json(HealthResponse {
        status: if completion_available { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        completion_available,
        quota_store: state.generator.tracker().store_name().to_string(),
    })
}

/// Usage for the calling actor
#[utoipa::path(
    get,
    path = "/v1/usage",
    tag = "Usage",
    responses(
        (status = 200, description = "Today's usage for the caller", body = UsageSnapshot),
        (status = 500, description = "Quota store error", body = ApiError)
    )
)]
#[instrument(skip_all)]
async fn get_usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<UsageSnapshot>, AppError> {
    let actor = request_actor(&state, &headers, peer);
    let usage = state.generator.usage(&actor).await?;
    Ok(Json(usage))
}

/// Generate a study pack
#[utoipa::path(
    post,
    path = "/v1/study-pack",
    tag = "Study",
    request_body = StudyPackRequest,
    responses(
        (status = 200, description = "Generated study pack", body = StudyPackResult),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 403, description = "Daily limit reached", body = ApiError),
        (status = 429, description = "Rate limit exceeded", body = ApiError),
        (status = 500, description = "Generation failed", body = ApiError)
    )
)]
#[instrument(skip_all)]
async fn generate_study_pack(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    request: Result<Json<StudyPackRequest>, JsonRejection>,
) -> Result<Json<StudyPackResult>, AppError> {
    let Json(request) = request.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let actor = request_actor(&state, &headers, peer);

    info!("Study pack requested by {} (mode={})", actor, request.mode);

    let result = state
        .generator
        .generate(&actor, &request.content, request.mode)
        .await?;

    Ok(Json(result))
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    StudyPack(StudyPackError),
}

impl From<StudyPackError> for AppError {
    fn from(e: StudyPackError) -> Self {
        AppError::StudyPack(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, error) = match self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, ApiError::invalid_request(msg))
            }
            AppError::StudyPack(e) => match e {
                StudyPackError::MalformedInput => {
                    (StatusCode::BAD_REQUEST, ApiError::invalid_request(e.to_string()))
                }
                StudyPackError::RateLimitExceeded { window_secs, .. } => {
                    retry_after = Some(window_secs);
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        ApiError::rate_limited(e.to_string()),
                    )
                }
                StudyPackError::DailyLimitReached { .. } => {
                    (StatusCode::FORBIDDEN, ApiError::daily_limit(e.to_string()))
                }
                StudyPackError::GenerationFailed => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::internal_error("Failed to generate study pack."),
                ),
                StudyPackError::Tracker(inner) => {
                    error!("Quota store failure: {}", inner);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ApiError::internal_error("Usage tracking is unavailable."),
                    )
                }
            },
        };

        let mut response = (status, Json(error)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Start the HTTP server
pub async fn start_server(state: Arc<AppState>) -> Result<(), std::io::Error> {
    let addr = state.config.server_addr();
    let router = create_router(state);

    info!("Starting StudyPack server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
