//! # Error Handling Framework
//!
//! Resilience primitives shared by the butler services:
//!
//! - Structured logging initialization
//! - Retry mechanisms with exponential backoff
//! - Circuit breaker for failing dependencies
//! - Graceful shutdown coordination
//!

pub mod circuit_breaker;
pub mod logging;
pub mod retry;
pub mod supervisor;

// Re-export commonly used types
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitHealth, CircuitState};
pub use logging::{init_logging, LoggingConfig, LoggingError};
pub use retry::{retry, RetryConfig, RetryPolicy, RetryableError};
pub use supervisor::{wait_for_signal, ShutdownHandle};
