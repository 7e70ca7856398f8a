//! Resilience primitives for the semantic path
//!
//! Bounded retry with exponential backoff plus jitter, a circuit breaker
//! that skips semantic work after repeated failures, and a degradation
//! tracker feeding the health report.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{CircuitBreakerConfig, RetryConfig};

// ============================================================================
// RETRY
// ============================================================================

/// Bounded retry with exponential backoff and jitter
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(config.base_delay_s.max(0.0)),
        }
    }

    /// Delay before retry attempt `n` (0-based): base · 2^n plus up to 50%
    /// jitter
    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let jitter = rand::rng().random_range(0.0..=backoff * 0.5);
        Duration::from_secs_f64(backoff + jitter)
    }

    /// Run `op` until it succeeds or attempts are exhausted
    pub fn run<T, E>(&self, mut op: impl FnMut() -> Result<T, E>) -> Result<T, E> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    std::thread::sleep(self.delay_for(attempt - 1));
                }
            }
        }
    }
}

// ============================================================================
// CIRCUIT BREAKER
// ============================================================================

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open: bool,
}

/// Circuit breaker: opens after N consecutive failures, skips the protected
/// operation for the recovery window, then lets a single probe through.
/// One success in half-open state closes it.
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: Duration::from_secs(config.recovery_timeout_s),
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
                half_open: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the protected operation may run now
    pub fn allow(&self) -> bool {
        let mut state = self.lock();
        match state.opened_at {
            None => true,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.recovery_timeout {
                    state.half_open = true;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
        state.half_open = false;
    }

    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures += 1;
        if state.half_open || state.consecutive_failures >= self.failure_threshold {
            // A failed half-open probe re-opens for a fresh window
            state.opened_at = Some(Instant::now());
            state.half_open = false;
        }
    }

    /// True while the breaker is rejecting calls
    pub fn is_open(&self) -> bool {
        let state = self.lock();
        match state.opened_at {
            None => false,
            Some(opened_at) => opened_at.elapsed() < self.recovery_timeout,
        }
    }
}

// ============================================================================
// DEGRADATION TRACKER
// ============================================================================

/// Component status for health reporting
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub name: String,
    pub degraded: bool,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
}

/// Records per-component failures without ever surfacing them to callers
#[derive(Default)]
pub struct DegradationTracker {
    components: Mutex<HashMap<String, ComponentStatus>>,
}

impl DegradationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_error(&self, component: &str, error: impl std::fmt::Display) {
        let mut components = self.components.lock().unwrap_or_else(|e| e.into_inner());
        let status = components
            .entry(component.to_string())
            .or_insert_with(|| ComponentStatus {
                name: component.to_string(),
                degraded: false,
                error_count: 0,
                last_error: None,
                last_error_at: None,
            });
        status.degraded = true;
        status.error_count += 1;
        status.last_error = Some(error.to_string());
        status.last_error_at = Some(Utc::now());
    }

    pub fn record_recovery(&self, component: &str) {
        let mut components = self.components.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(status) = components.get_mut(component) {
            status.degraded = false;
        }
    }

    pub fn is_degraded(&self, component: &str) -> bool {
        let components = self.components.lock().unwrap_or_else(|e| e.into_inner());
        components.get(component).map(|s| s.degraded).unwrap_or(false)
    }

    pub fn snapshot(&self) -> Vec<ComponentStatus> {
        let components = self.components.lock().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<_> = components.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

// ============================================================================
// TESTS
// ============================================================================
