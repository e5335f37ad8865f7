//! Work-Order Service
//!
//! Consumes envelopes from the work-order queue, persists one work order
//! per request and keeps an in-memory status projection that guests poll
//! through `GET /api/v1/workorder/status/{requestID}`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use config_rs::ConfigError;
use error_handling_rs::{CircuitHealth, CircuitState, LoggingError};
use gateway_auth::{cors_layer, error_response, require_bearer, AuthError, JwtVerifier};
use once_cell::sync::Lazy;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use work_order_store::{FileBackedRepository, StoreError, WorkOrderRepository};
use work_queue::{connect_queue, MessageQueue, QueueError};

pub mod config;
pub mod consumer;
pub mod projection;

pub use config::WorkOrderConfig;
pub use consumer::{ConsumerConfig, ConsumerStats, DeliveryOutcome, WorkOrderConsumer};
pub use projection::{rehydrate, DashMapProjection, StatusProjection};

pub const STATUS_PATH: &str = "/api/v1/workorder/status/:request_id";

const MAX_REQUEST_ID_LEN: usize = 128;

// Track service start time for uptime reporting
pub static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Start-up failures; any of these ends the process
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Backends opened at start-up
pub struct Components {
    pub queue: Arc<dyn MessageQueue>,
    pub dead_letter: Option<Arc<dyn MessageQueue>>,
    pub store: Arc<dyn WorkOrderRepository>,
    pub projection: Arc<dyn StatusProjection>,
}

/// Connect the queues, open the store and rebuild the projection
pub async fn open_components(config: &WorkOrderConfig) -> Result<Components, ServiceError> {
    let queue = connect_queue(&config.queue_url, &config.queue_name, config.visibility_timeout).await?;
    let recovered = queue.recover_in_flight().await?;
    if recovered > 0 {
        warn!(recovered, queue = queue.name(), "Requeued deliveries left in flight by a previous run");
    }

    let dead_letter = match &config.dead_letter_queue {
        Some(name) => Some(connect_queue(&config.queue_url, name, config.visibility_timeout).await?),
        None => None,
    };

    let repository = FileBackedRepository::open_collection(&config.store_dir, &config.db, &config.collection).await?;
    info!(path = %repository.path().display(), "Work-order store opened");
    let store: Arc<dyn WorkOrderRepository> = Arc::new(repository);

    let projection: Arc<dyn StatusProjection> = Arc::new(DashMapProjection::new());
    if config.rehydrate {
        rehydrate(projection.as_ref(), store.as_ref()).await?;
    }

    Ok(Components {
        queue,
        dead_letter,
        store,
        projection,
    })
}

pub struct AppState {
    pub service_name: String,
    pub projection: Arc<dyn StatusProjection>,
    pub consumer: Arc<WorkOrderConsumer>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub service_name: String,
    pub uptime_seconds: i64,
    pub status: String,
    pub consumer: ConsumerStats,
    pub store_circuit: CircuitHealth,
    pub projection_entries: usize,
}

/// Request IDs are 1..=128 characters of `[A-Za-z0-9_-]`
pub fn is_valid_request_id(request_id: &str) -> bool {
    !request_id.is_empty()
        && request_id.len() <= MAX_REQUEST_ID_LEN
        && request_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// GET /api/v1/workorder/status/:request_id
async fn status_handler(State(state): State<Arc<AppState>>, Path(request_id): Path<String>) -> Response {
    if !is_valid_request_id(&request_id) {
        return error_response(StatusCode::BAD_REQUEST, "malformed request ID");
    }

    match state.projection.get(&request_id) {
        Some(order) => Json(order.as_ref()).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No work order found for request {}", request_id),
        ),
    }
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let circuit = state.consumer.circuit_health();
    let healthy = circuit.state != CircuitState::Open;

    Json(HealthResponse {
        healthy,
        service_name: state.service_name.clone(),
        uptime_seconds: START_TIME.elapsed().as_secs() as i64,
        status: if healthy { "SERVING" } else { "DEGRADED" }.to_string(),
        consumer: state.consumer.stats(),
        store_circuit: circuit,
        projection_entries: state.projection.len(),
    })
}

/// GET /
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "GET /health",
            "GET /api/v1/workorder/status/{requestID}",
        ]
    }))
}

/// Build the status router with auth and CORS layers
pub fn router(state: Arc<AppState>, verifier: Arc<JwtVerifier>) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(STATUS_PATH, get(status_handler))
        .layer(middleware::from_fn_with_state(verifier, require_bearer))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
