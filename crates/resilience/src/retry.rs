//! Retry with fixed or exponential backoff, consumed by
//! [`crate::ResilienceRegistry::execute`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff strategy for computing the delay between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: `base * multiplier^(attempt - 1)`.
    Exponential,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Exponential
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first (non-retry) call.
    pub max_attempts: u32,
    pub base_wait: Duration,
    pub max_wait: Duration,
    pub multiplier: f64,
    pub strategy: BackoffStrategy,
    /// Jitter factor in `[0.0, 1.0]` applied to the computed delay.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_wait: Duration::from_millis(200),
            max_wait: Duration::from_secs(30),
            multiplier: 2.0,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts,
            base_wait: wait,
            max_wait: wait,
            multiplier: 1.0,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_wait: Duration, max_wait: Duration, multiplier: f64) -> Self {
        Self { max_attempts, base_wait, max_wait, multiplier, strategy: BackoffStrategy::Exponential, jitter: 0.1 }
    }

    /// Delay before the given 1-indexed retry attempt (`attempt` counts
    /// retries, not the initial call: `attempt == 1` is the first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_wait.as_millis() as f64;
        let max_ms = self.max_wait.as_millis() as f64;

        let delay_ms = match self.strategy {
            BackoffStrategy::Fixed => base_ms,
            BackoffStrategy::Exponential => {
                let exp = self.multiplier.powi((attempt - 1) as i32);
                (base_ms * exp).min(max_ms)
            }
        };

        let jitter_range = delay_ms * self.jitter;
        let jitter = if jitter_range > 0.0 {
            // Deterministic pseudo-jitter keyed on the attempt number — the
            // resilience layer's tests must be reproducible, and true
            // randomness is out of scope for a policy object.
            let pseudo_random = ((attempt as f64 * 17.0) % 100.0) / 100.0;
            jitter_range * (pseudo_random - 0.5) * 2.0
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter).max(0.0) as u64)
    }

    /// Whether attempt number `attempt` (1-indexed, counting the calls
    /// already made) should be followed by a retry.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
