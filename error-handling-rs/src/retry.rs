//! # Retry Mechanism
//!
//! Exponential backoff with jitter for transient failures. The policy is
//! used directly by the queue consumer (backoff between failed
//! persistence attempts) and through [`retry`] by the intake publisher.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

/// A trait for errors that can be retried
pub trait RetryableError {
    /// Returns true if the error is transient and the operation might succeed on retry
    fn is_transient(&self) -> bool;

    /// Returns the suggested delay before retrying
    fn suggested_delay(&self) -> Option<Duration> {
        None
    }
}

/// Configuration for a retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    pub max_retries: usize,

    /// Base duration for exponential backoff
    pub base_backoff: Duration,

    /// Maximum backoff time
    pub max_backoff: Duration,

    /// Jitter factor (0.0 - 1.0) to add randomness to backoff
    pub jitter_factor: f64,

    /// Whether to retry only transient errors
    pub retry_only_transient: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.1,
            retry_only_transient: true,
        }
    }
}

/// A retry policy that determines how to handle retries
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    name: String,
}

impl RetryPolicy {
    /// Creates a new retry policy with the given name and configuration
    pub fn new<S: Into<String>>(name: S, config: Option<RetryConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            name: name.into(),
        }
    }

    /// Creates a policy for queue publish operations
    pub fn network() -> Self {
        let config = RetryConfig {
            max_retries: 4,
            base_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            jitter_factor: 0.2,
            retry_only_transient: true,
        };
        Self::new("network", Some(config))
    }

    /// Creates a policy for durable-store operations
    pub fn database() -> Self {
        let config = RetryConfig {
            max_retries: usize::MAX,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.1,
            retry_only_transient: false,
        };
        Self::new("database", Some(config))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Checks if an error is retryable according to this policy
    pub fn is_retryable<E: RetryableError>(&self, error: &E, attempt: usize) -> bool {
        if attempt >= self.config.max_retries {
            return false;
        }

        if self.config.retry_only_transient && !error.is_transient() {
            return false;
        }

        true
    }

    /// Backoff before retry number `attempt` (0-based), without error hints
    pub fn backoff_for_attempt(&self, attempt: usize) -> Duration {
        let base_ms = self.config.base_backoff.as_millis() as f64;
        let max_ms = self.config.max_backoff.as_millis() as f64;

        // Clamp the exponent so large attempt counts cannot overflow to inf
        let exponent = attempt.min(32) as i32;
        let capped_backoff = (base_ms * 2.0_f64.powi(exponent)).min(max_ms);

        let jitter_range = capped_backoff * self.config.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..jitter_range)
        } else {
            0.0
        };

        let final_backoff_ms = (capped_backoff + jitter).clamp(0.0, max_ms);
        Duration::from_millis(final_backoff_ms as u64)
    }

    /// Calculates the backoff duration for a retry, honoring error hints
    pub fn calculate_backoff<E: RetryableError>(&self, error: &E, attempt: usize) -> Duration {
        if let Some(delay) = error.suggested_delay() {
            return delay.min(self.config.max_backoff);
        }
        self.backoff_for_attempt(attempt)
    }
}

/// Runs `operation` until it succeeds or the policy gives up
///
/// Returns the last error when retries are exhausted or the error is not
/// retryable.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0usize;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(policy = %policy.name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !policy.is_retryable(&err, attempt) {
                    counter!("retry.exhausted", 1, "policy" => policy.name.clone());
                    return Err(err);
                }
                let delay = policy.calculate_backoff(&err, attempt);
                warn!(
                    policy = %policy.name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                counter!("retry.attempt", 1, "policy" => policy.name.clone());
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient={})", self.transient)
        }
    }

    impl RetryableError for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(
            "test",
            Some(RetryConfig {
                max_retries,
                base_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                jitter_factor: 0.0,
                retry_only_transient: true,
            }),
        )
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::new(
            "caps",
            Some(RetryConfig {
                max_retries: 10,
                base_backoff: Duration::from_millis(100),
                max_backoff: Duration::from_millis(1000),
                jitter_factor: 0.0,
                retry_only_transient: false,
            }),
        );

        assert_eq!(policy.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.backoff_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff_for_attempt(10_000), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_within_ceiling() {
        let policy = RetryPolicy::database();
        for attempt in 0..50 {
            assert!(policy.backoff_for_attempt(attempt) <= policy.config().max_backoff);
        }
    }

    #[test]
    fn test_non_transient_not_retried() {
        let policy = fast_policy(3);
        assert!(!policy.is_retryable(&TestError { transient: false }, 0));
        assert!(policy.is_retryable(&TestError { transient: true }, 2));
        assert!(!policy.is_retryable(&TestError { transient: true }, 3));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<u32, TestError> = retry(&fast_policy(3), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let result: Result<(), TestError> = retry(&fast_policy(2), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { transient: true })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
