use std::sync::Arc;
use std::time::Duration;

use error_handling_rs::{init_logging, wait_for_signal, LoggingConfig};
use gateway_auth::JwtVerifier;
use intake_gateway::{config::SERVICE_KEY, router, AppState, IntakeConfig, IntakeService, PublishDispatcher, START_TIME};
use once_cell::sync::Lazy;
use request_router::KeywordClassifier;
use tracing::{info, warn};
use work_queue::connect_queue;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config_rs::load_dotenv();

    let service_name = config_rs::get_formatted_service_name(SERVICE_KEY);
    init_logging(Some(LoggingConfig::from_env(&service_name)))?;
    Lazy::force(&START_TIME);

    let config = IntakeConfig::from_env()?;
    info!(queue = %config.queue_name, addr = %config.bind_addr, "Starting intake gateway");

    let queue = connect_queue(&config.queue_url, &config.queue_name, config.visibility_timeout).await?;
    let verifier = Arc::new(JwtVerifier::new(&config.jwt_secret)?);

    let dispatcher = Arc::new(PublishDispatcher::start(queue, config.dispatcher.clone()));
    let state = Arc::new(AppState {
        service_name: service_name.clone(),
        intake: IntakeService::new(Arc::new(KeywordClassifier), dispatcher.clone()),
        dispatcher: dispatcher.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("{} listening on {}", service_name, config.bind_addr);

    axum::serve(listener, router(state, verifier))
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    if !dispatcher.shutdown(DRAIN_TIMEOUT).await {
        warn!("Exiting with undelivered envelopes");
    }
    info!(stats = ?dispatcher.stats(), "Intake gateway stopped");
    Ok(())
}
