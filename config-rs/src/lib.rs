//! config-rs/lib.rs
//! Shared configuration utilities for the butler services
//! Provides standardized functions for port/address management and
//! typed access to environment-supplied settings

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Errors raised while reading required configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Load a `.env` file from the working directory if one exists
pub fn load_dotenv() {
    if let Ok(path) = dotenv::dotenv() {
        log::debug!("Loaded environment from {}", path.display());
    }
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "INTAKE", "WORK_ORDER")
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// The port number to use for the service
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", service_name.to_uppercase());
    env::var(&var_name)
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        })
}

/// Create a SocketAddr for binding a service
///
/// A full `{SERVICE}_SERVICE_ADDR` override wins (plain `host:port` or
/// `http://host:port`); otherwise binds `0.0.0.0` on the configured port.
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", service_name.to_uppercase());

    if let Ok(addr_str) = env::var(&var_name) {
        let trimmed = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);
        match trimmed.parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Read a variable that must be present and non-empty
pub fn required_var(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name.to_string())),
    }
}

/// Read a variable or fall back to a default
pub fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Optional variable; empty values count as unset
pub fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Truthy parsing: "1", "true", "yes", "on" (case-insensitive)
pub fn parse_bool_var(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(val) => {
            let v = val.trim().to_ascii_lowercase();
            match v.as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    log::warn!("Unrecognized boolean in {}: '{}', using default {}", name, val, default);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

/// Numeric variable with a default; invalid values are a hard error
pub fn usize_var(name: &str, default: usize) -> Result<usize, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
            name: name.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Optional numeric variable
pub fn optional_u32_var(name: &str) -> Result<Option<u32>, ConfigError> {
    optional_var(name)
        .map(|raw| {
            raw.trim().parse::<u32>().map_err(|e| ConfigError::Invalid {
                name: name.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Millisecond duration variable with a default
pub fn duration_ms_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Invalid {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        None => Ok(default),
    }
}

/// Get service name for logging and monitoring
pub fn get_formatted_service_name(service_name: &str) -> String {
    match service_name {
        "INTAKE" => "intake-gateway".to_string(),
        "WORK_ORDER" => "work-order-service".to_string(),
        _ => format!("{}-service", service_name.to_lowercase().replace('_', "-")),
    }
}

/// Get default port for a specific service
pub fn get_default_port(service_name: &str) -> u16 {
    match service_name.to_uppercase().as_str() {
        "INTAKE" => 8081,
        "WORK_ORDER" => 8082,
        _ => 8100,
    }
}
