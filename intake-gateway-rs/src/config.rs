// intake-gateway-rs/src/config.rs

use std::net::SocketAddr;
use std::time::Duration;

use config_rs::{
    duration_ms_var, get_bind_address, get_default_port, required_var, usize_var, var_or, ConfigError,
};

use crate::dispatcher::DispatcherConfig;

pub const SERVICE_KEY: &str = "INTAKE";

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub bind_addr: SocketAddr,
    pub queue_url: String,
    pub queue_name: String,
    pub visibility_timeout: Duration,
    pub jwt_secret: String,
    pub dispatcher: DispatcherConfig,
}

impl IntakeConfig {
    /// Load configuration from environment variables.
    ///
    /// `QUEUE_URL` and `JWT_SECRET` are required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            workers: usize_var("PUBLISH_WORKERS", defaults.workers)?.max(1),
            capacity: usize_var("PUBLISH_QUEUE_CAPACITY", defaults.capacity)?.max(1),
            enqueue_timeout: duration_ms_var("PUBLISH_ENQUEUE_TIMEOUT_MS", defaults.enqueue_timeout)?,
            ..defaults
        };

        Ok(Self {
            bind_addr: get_bind_address(SERVICE_KEY, get_default_port(SERVICE_KEY)),
            queue_url: required_var("QUEUE_URL")?,
            queue_name: var_or("QUEUE_NAME", "work-orders"),
            visibility_timeout: duration_ms_var("QUEUE_VISIBILITY_TIMEOUT_MS", Duration::from_secs(30))?,
            jwt_secret: required_var("JWT_SECRET")?,
            dispatcher,
        })
    }
}
