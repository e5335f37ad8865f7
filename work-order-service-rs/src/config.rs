// work-order-service-rs/src/config.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config_rs::{
    duration_ms_var, get_bind_address, get_default_port, optional_u32_var, optional_var, parse_bool_var,
    required_var, usize_var, var_or, ConfigError,
};

use crate::consumer::ConsumerConfig;

pub const SERVICE_KEY: &str = "WORK_ORDER";

#[derive(Debug, Clone)]
pub struct WorkOrderConfig {
    pub bind_addr: SocketAddr,
    pub queue_url: String,
    pub queue_name: String,
    pub dead_letter_queue: Option<String>,
    pub visibility_timeout: Duration,
    pub jwt_secret: String,
    pub store_dir: PathBuf,
    pub db: String,
    pub collection: String,
    pub consumer: ConsumerConfig,
    /// Load stored work orders into the projection at start-up
    pub rehydrate: bool,
}

impl WorkOrderConfig {
    /// Load configuration from environment variables.
    ///
    /// `QUEUE_URL` and `JWT_SECRET` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ConsumerConfig::default();
        let consumer = ConsumerConfig {
            workers: usize_var("CONSUMER_WORKERS", defaults.workers)?.max(1),
            receive_wait: duration_ms_var("CONSUMER_RECEIVE_WAIT_MS", defaults.receive_wait)?,
            max_deliveries: optional_u32_var("CONSUMER_MAX_DELIVERIES")?.filter(|n| *n > 0),
            ..defaults
        };

        Ok(Self {
            bind_addr: get_bind_address(SERVICE_KEY, get_default_port(SERVICE_KEY)),
            queue_url: required_var("QUEUE_URL")?,
            queue_name: var_or("QUEUE_NAME", "work-orders"),
            dead_letter_queue: optional_var("DEAD_LETTER_QUEUE_NAME").filter(|name| !name.trim().is_empty()),
            visibility_timeout: duration_ms_var("QUEUE_VISIBILITY_TIMEOUT_MS", Duration::from_secs(30))?,
            jwt_secret: required_var("JWT_SECRET")?,
            store_dir: PathBuf::from(var_or("WORK_ORDER_STORE_DIR", "data")),
            db: var_or("WORK_ORDER_DB", "virtualbutler"),
            collection: var_or("WORK_ORDER_COLLECTION", "work_orders"),
            consumer,
            rehydrate: parse_bool_var("PROJECTION_REHYDRATE", true),
        })
    }
}
