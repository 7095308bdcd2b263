//! `execute(name, op)`: retry wrapped around the op, the whole chain wrapped
//! in the circuit breaker for `name`. Per-name
//! breakers live in a process-singleton registry passed explicitly through
//! constructors — no ambient global state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gridflow_core::RuntimeConfig;
use gridflow_observability::MetricsRegistry;

use crate::circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig};
use crate::error::{Classify, ResilienceError};
use crate::retry::{BackoffStrategy, RetryPolicy};

/// Process-wide registry of named circuit breakers plus the `execute()`
/// composition entry point.
pub struct ResilienceRegistry {
    config: Arc<RuntimeConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl ResilienceRegistry {
    pub fn new(config: Arc<RuntimeConfig>) -> Self {
        Self { config, breakers: Mutex::new(HashMap::new()), metrics: None }
    }

    pub fn with_metrics(config: Arc<RuntimeConfig>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { config, breakers: Mutex::new(HashMap::new()), metrics: Some(metrics) }
    }

    fn breaker_for(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().expect("resilience registry lock poisoned");
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let instance = self.config.resilience_instance(name);
                Arc::new(CircuitBreaker::new(
                    name,
                    CircuitBreakerConfig {
                        failure_rate_threshold: instance.failure_rate_threshold,
                        minimum_calls: instance.minimum_calls,
                        sliding_window_size: instance.sliding_window_size,
                        wait_duration_in_open: instance.wait_duration_in_open,
                        permitted_calls_in_half_open: instance.permitted_calls_in_half_open,
                    },
                ))
            })
            .clone()
    }

    fn retry_policy_for(&self, name: &str) -> RetryPolicy {
        let instance = self.config.resilience_instance(name);
        RetryPolicy {
            max_attempts: instance.max_attempts,
            base_wait: instance.wait_duration,
            max_wait: Duration::from_secs(30),
            multiplier: instance.multiplier,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    /// The circuit breaker's current state for a named instance, mostly
    /// useful for tests and diagnostics.
    pub fn breaker_state(&self, name: &str) -> crate::circuit_breaker::CircuitState {
        self.breaker_for(name).state()
    }

    fn record(&self, name: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_resilience_call(name, outcome);
        }
    }

    /// Run `op`, retrying on retryable failures and failing fast when the
    /// named breaker is OPEN. `NonRetryable` errors (per [`Classify`]) are
    /// never retried and never counted toward opening the breaker.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, ResilienceError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        let breaker = self.breaker_for(name);
        let retry_policy = self.retry_policy_for(name);
        let mut attempt: u32 = 0;

        loop {
            if self.config.resilience_enabled && breaker.try_acquire() == Admission::Rejected {
                self.record(name, "rejections");
                return Err(ResilienceError::CircuitOpen(name.to_string()));
            }

            attempt += 1;
            self.record(name, "attempts");

            match op().await {
                Ok(value) => {
                    if self.config.resilience_enabled {
                        breaker.record_success();
                    }
                    self.record(name, "successes");
                    return Ok(value);
                }
                Err(err) => {
                    if err.is_non_retryable() {
                        self.record(name, "ignored-errors");
                        return Err(ResilienceError::OperationFailed(err));
                    }

                    if self.config.resilience_enabled {
                        breaker.record_failure();
                    }

                    if retry_policy.should_retry(attempt) {
                        self.record(name, "retries");
                        tokio::time::sleep(retry_policy.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    self.record(name, "failures");
                    return Err(ResilienceError::OperationFailed(err));
                }
            }
        }
    }
}
