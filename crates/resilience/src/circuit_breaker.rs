//! Per-name circuit breaker over a count-based sliding window of outcomes,
//! implementing the CLOSED → OPEN → HALF_OPEN → CLOSED state machine.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Per-instance circuit breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failure rate (0-100) that trips the breaker once `minimum_calls` is
    /// satisfied.
    pub failure_rate_threshold: f64,
    /// Minimum calls in the window before the failure rate is evaluated.
    pub minimum_calls: u32,
    /// Count-based rolling window size.
    pub sliding_window_size: u32,
    /// How long the breaker stays OPEN before probing with HALF_OPEN calls.
    pub wait_duration_in_open: Duration,
    /// Consecutive successes required in HALF_OPEN to close the breaker.
    pub permitted_calls_in_half_open: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_calls: 10,
            sliding_window_size: 20,
            wait_duration_in_open: Duration::from_secs(30),
            permitted_calls_in_half_open: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

struct Inner {
    state: CircuitState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
}

/// Whether a call may proceed through the breaker right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

/// A single named circuit breaker instance.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_successes: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker lock poisoned").state
    }

    /// Check whether a call may proceed, transitioning OPEN → HALF_OPEN if
    /// `wait_duration_in_open` has elapsed.
    pub fn try_acquire(&self) -> Admission {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => Admission::Allowed,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= self.config.wait_duration_in_open {
                    tracing::debug!(breaker = %self.name, "transitioning OPEN -> HALF_OPEN");
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    /// Record the outcome of a call that was admitted.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                push_bounded(&mut inner.window, true, self.config.sliding_window_size);
            }
            CircuitState::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.permitted_calls_in_half_open {
                    tracing::info!(breaker = %self.name, "transitioning HALF_OPEN -> CLOSED");
                    inner.state = CircuitState::Closed;
                    inner.window.clear();
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            CircuitState::Closed => {
                push_bounded(&mut inner.window, false, self.config.sliding_window_size);
                if self.should_trip(&inner.window) {
                    tracing::warn!(breaker = %self.name, "transitioning CLOSED -> OPEN");
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = %self.name, "transitioning HALF_OPEN -> OPEN");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.window.clear();
            }
            CircuitState::Open => {}
        }
    }

    fn should_trip(&self, window: &VecDeque<bool>) -> bool {
        if window.len() < self.config.minimum_calls as usize {
            return false;
        }
        let failures = window.iter().filter(|outcome| !**outcome).count();
        let failure_rate = (failures as f64 / window.len() as f64) * 100.0;
        failure_rate >= self.config.failure_rate_threshold
    }
}

fn push_bounded(window: &mut VecDeque<bool>, outcome: bool, capacity: u32) {
    window.push_back(outcome);
    while window.len() > capacity as usize {
        window.pop_front();
    }
}
