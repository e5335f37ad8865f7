//! Intake Gateway
//!
//! HTTP front door for guest requests. A request is classified, stamped
//! with a request ID and acknowledged immediately; publishing to the
//! work-order queue happens on the dispatcher's worker pool.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use gateway_auth::{cors_layer, error_response, require_bearer, JwtVerifier};
use once_cell::sync::Lazy;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

pub mod config;
pub mod dispatcher;
pub mod service;
pub mod validation;

pub use config::IntakeConfig;
pub use dispatcher::{DispatcherConfig, OutboundMessage, PublishDispatcher, PublishStats};
pub use service::{ChatAck, ChatRequest, IntakeError, IntakeService};
pub use validation::{parse_chat_request, validate_content_type, ApiValidationError, MAX_PAYLOAD_SIZE};

pub const CHAT_REQUEST_PATH: &str = "/api/v1/chat/request";

// Track service start time for uptime reporting
pub static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

pub struct AppState {
    pub service_name: String,
    pub intake: IntakeService,
    pub dispatcher: Arc<PublishDispatcher>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: i64,
    pub status: String,
    pub publish: PublishStats,
}

/// POST /api/v1/chat/request
async fn chat_request_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if let Err(e) = validate_content_type(&headers, "application/json") {
        return e.into_response();
    }

    let request = match body
        .map_err(ApiValidationError::from_body_rejection)
        .and_then(|bytes| parse_chat_request(&bytes))
    {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state.intake.submit(request).await {
        Ok(ack) => Json(ack).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to accept guest request");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to accept request")
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let accepting = state.dispatcher.is_accepting().await;

    Json(HealthResponse {
        healthy: accepting,
        service_name: state.service_name.clone(),
        uptime_seconds: START_TIME.elapsed().as_secs() as i64,
        status: if accepting { "SERVING" } else { "SHUTTING_DOWN" }.to_string(),
        publish: state.dispatcher.stats(),
    })
}

/// GET /
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            format!("POST {}", CHAT_REQUEST_PATH),
        ]
    }))
}

/// Build the intake router with auth, body limit and CORS layers
pub fn router(state: Arc<AppState>, verifier: Arc<JwtVerifier>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(CHAT_REQUEST_PATH, post(chat_request_handler))
        .layer(middleware::from_fn_with_state(verifier, require_bearer))
        .layer(DefaultBodyLimit::max(MAX_PAYLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
