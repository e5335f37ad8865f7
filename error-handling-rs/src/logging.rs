//! # Structured Logging
//!
//! Installs the process-wide `tracing` subscriber used by every butler
//! service. JSON output is the default; a text layer is available for
//! local development.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

// Flag to track if logging has been initialized
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Errors raised while installing the subscriber
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to set global subscriber: {0}")]
    Install(String),
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// The log level to use (trace, debug, info, warn, error)
    pub level: String,
    /// The service name for identification
    pub service_name: String,
    /// Whether to use JSON formatting
    pub json_format: bool,
    /// Whether to include file and line information
    pub include_source_code: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            service_name: "unknown-service".to_string(),
            json_format: true,
            include_source_code: true,
        }
    }
}

impl LoggingConfig {
    /// Build from `LOG_LEVEL` and `LOG_FORMAT` (`json` or `text`)
    pub fn from_env(service_name: &str) -> Self {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let json_format = !matches!(
            std::env::var("LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref(),
            Ok("text") | Ok("pretty")
        );

        Self {
            level,
            service_name: service_name.to_string(),
            json_format,
            ..Default::default()
        }
    }
}

/// Initializes the structured logging system
///
/// `RUST_LOG` overrides the configured level. Calling this more than once
/// is a no-op.
pub fn init_logging(config: Option<LoggingConfig>) -> Result<(), LoggingError> {
    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let config = config.unwrap_or_default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,h2=warn", config.level)));

    let registry = Registry::default().with(filter);

    // JSON and text layers have distinct types, so each branch installs its own subscriber.
    let installed = if config.json_format {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(true)
            .with_file(config.include_source_code)
            .with_line_number(config.include_source_code);
        registry.with(json_layer).try_init()
    } else {
        let text_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true);
        registry.with(text_layer).try_init()
    };

    installed.map_err(|e| LoggingError::Install(e.to_string()))?;

    LOGGING_INITIALIZED.store(true, Ordering::SeqCst);

    tracing::info!(
        service = %config.service_name,
        level = %config.level,
        json = %config.json_format,
        "Structured logging initialized"
    );

    Ok(())
}
