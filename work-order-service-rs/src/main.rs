use std::sync::Arc;
use std::time::Duration;

use error_handling_rs::{init_logging, wait_for_signal, LoggingConfig, ShutdownHandle};
use gateway_auth::JwtVerifier;
use once_cell::sync::Lazy;
use tracing::{info, warn};
use work_order_service::{
    config::SERVICE_KEY, open_components, router, AppState, ServiceError, WorkOrderConfig, WorkOrderConsumer,
    START_TIME,
};

/// Grace period on top of one receive wait for workers to finish
const DRAIN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config_rs::load_dotenv();

    let service_name = config_rs::get_formatted_service_name(SERVICE_KEY);
    init_logging(Some(LoggingConfig::from_env(&service_name))).map_err(ServiceError::from)?;
    Lazy::force(&START_TIME);

    let config = WorkOrderConfig::from_env().map_err(ServiceError::from)?;
    info!(
        queue = %config.queue_name,
        dead_letter = ?config.dead_letter_queue,
        addr = %config.bind_addr,
        "Starting work-order service"
    );

    let components = open_components(&config).await?;
    let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret).map_err(ServiceError::from)?);

    let mut consumer = WorkOrderConsumer::new(
        components.queue,
        components.store,
        components.projection.clone(),
        config.consumer.clone(),
    );
    if let Some(dead_letter) = components.dead_letter {
        consumer = consumer.with_dead_letter(dead_letter);
    }
    let consumer = Arc::new(consumer);

    let mut shutdown = ShutdownHandle::new(service_name.clone()).with_timeout(config.consumer.receive_wait + DRAIN_GRACE);
    consumer.spawn_workers(&mut shutdown);
    let draining = consumer.clone();
    shutdown.add_shutdown_hook(move || {
        info!(stats = ?draining.stats(), circuit = ?draining.circuit_health().state, "Draining consumer workers");
    });

    let state = Arc::new(AppState {
        service_name: service_name.clone(),
        projection: components.projection,
        consumer: consumer.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(ServiceError::from)?;
    info!("{} listening on {}", service_name, config.bind_addr);

    axum::serve(listener, router(state, verifier))
        .with_graceful_shutdown(wait_for_signal())
        .await
        .map_err(ServiceError::from)?;

    if !shutdown.shutdown().await {
        warn!("Consumer workers did not stop cleanly");
    }
    info!(stats = ?consumer.stats(), "Work-order service stopped");
    Ok(())
}
