//! # Circuit Breaker
//!
//! Trips after a run of consecutive failures against a dependency and
//! keeps callers away from it until `reset_timeout` elapses. After the
//! timeout a limited number of trial calls are let through (half-open);
//! enough successes close the circuit again, any failure re-opens it.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, requests allowed
    Closed,
    /// Failing, requests blocked
    Open,
    /// Testing recovery, limited requests allowed
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF-OPEN"),
        }
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that trip the circuit
    pub failure_threshold: u32,
    /// How long the circuit stays open before probing
    pub reset_timeout: Duration,
    /// Successes needed in half-open state to close the circuit
    pub half_open_success_threshold: u32,
    /// Concurrent trial calls allowed while half-open
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_success_threshold: 1,
            half_open_max_calls: 1,
        }
    }
}

/// Point-in-time view of a circuit
#[derive(Debug, Clone, Serialize)]
pub struct CircuitHealth {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub times_opened: u64,
}

#[derive(Debug)]
struct CircuitStats {
    state: CircuitState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    half_open_successes: u32,
    half_open_in_flight: u32,
    total_failures: u64,
    total_successes: u64,
    times_opened: u64,
}

impl CircuitStats {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            opened_at: None,
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            total_failures: 0,
            total_successes: 0,
            times_opened: 0,
        }
    }
}

/// Circuit breaker guarding a single named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    stats: Mutex<CircuitStats>,
}

impl CircuitBreaker {
    pub fn new<S: Into<String>>(name: S, config: Option<CircuitBreakerConfig>) -> Self {
        Self {
            name: name.into(),
            config: config.unwrap_or_default(),
            stats: Mutex::new(CircuitStats::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CircuitStats> {
        // A poisoned lock only means another thread panicked mid-update;
        // the counters are still usable.
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn transition(&self, stats: &mut CircuitStats, to: CircuitState) {
        if stats.state == to {
            return;
        }
        let from = stats.state;
        stats.state = to;
        match to {
            CircuitState::Open => {
                stats.opened_at = Some(Instant::now());
                stats.times_opened += 1;
                warn!(circuit = %self.name, %from, %to, "Circuit opened");
            }
            CircuitState::HalfOpen => {
                stats.half_open_successes = 0;
                stats.half_open_in_flight = 0;
                info!(circuit = %self.name, %from, %to, "Circuit probing");
            }
            CircuitState::Closed => {
                stats.opened_at = None;
                stats.consecutive_failures = 0;
                info!(circuit = %self.name, %from, %to, "Circuit closed");
            }
        }
        gauge!(
            "circuit_breaker.state",
            match to {
                CircuitState::Closed => 0.0,
                CircuitState::HalfOpen => 0.5,
                CircuitState::Open => 1.0,
            },
            "circuit" => self.name.clone()
        );
    }

    /// Check whether a call may proceed, moving Open -> HalfOpen once the
    /// reset timeout has elapsed
    pub fn is_allowed(&self) -> bool {
        let mut stats = self.lock();
        match stats.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = stats.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.reset_timeout {
                    self.transition(&mut stats, CircuitState::HalfOpen);
                    stats.half_open_in_flight = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if stats.half_open_in_flight < self.config.half_open_max_calls {
                    stats.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Time left before an open circuit starts probing
    pub fn remaining_open_time(&self) -> Option<Duration> {
        let stats = self.lock();
        match (stats.state, stats.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                Some(self.config.reset_timeout.saturating_sub(opened_at.elapsed()))
            }
            _ => None,
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut stats = self.lock();
        stats.total_successes += 1;
        stats.consecutive_failures = 0;
        if stats.state == CircuitState::HalfOpen {
            stats.half_open_in_flight = stats.half_open_in_flight.saturating_sub(1);
            stats.half_open_successes += 1;
            if stats.half_open_successes >= self.config.half_open_success_threshold {
                self.transition(&mut stats, CircuitState::Closed);
            }
        }
        counter!("circuit_breaker.success", 1, "circuit" => self.name.clone());
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut stats = self.lock();
        stats.total_failures += 1;
        stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
        match stats.state {
            CircuitState::HalfOpen => self.transition(&mut stats, CircuitState::Open),
            CircuitState::Closed if stats.consecutive_failures >= self.config.failure_threshold => {
                self.transition(&mut stats, CircuitState::Open)
            }
            _ => {}
        }
        counter!("circuit_breaker.failure", 1, "circuit" => self.name.clone());
    }

    /// Release a half-open trial slot without recording an outcome
    pub fn release(&self) {
        let mut stats = self.lock();
        if stats.state == CircuitState::HalfOpen {
            stats.half_open_in_flight = stats.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Get current state of the circuit
    pub fn get_state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn get_health(&self) -> CircuitHealth {
        let stats = self.lock();
        CircuitHealth {
            state: stats.state,
            consecutive_failures: stats.consecutive_failures,
            total_failures: stats.total_failures,
            total_successes: stats.total_successes,
            times_opened: stats.times_opened,
        }
    }
}
