// work-queue-rs/src/error.rs

use std::time::Duration;

use error_handling_rs::RetryableError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt queue entry: {0}")]
    Corrupt(String),

    #[error("delivery '{0}' is no longer leased")]
    LeaseLost(String),

    #[error("unsupported queue URL '{0}' (expected memory:// or redis://)")]
    UnsupportedUrl(String),
}

impl RetryableError for QueueError {
    fn is_transient(&self) -> bool {
        match self {
            QueueError::Unavailable(_) => true,
            QueueError::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_timeout(),
            QueueError::Corrupt(_) | QueueError::LeaseLost(_) | QueueError::UnsupportedUrl(_) => false,
        }
    }

    fn suggested_delay(&self) -> Option<Duration> {
        match self {
            QueueError::Unavailable(_) => Some(Duration::from_millis(250)),
            _ => None,
        }
    }
}
