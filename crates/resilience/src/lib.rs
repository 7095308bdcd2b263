//! Circuit breakers, retry with backoff, and non-retryable classification
//!. `ResilienceRegistry::execute` is the sole composition entry
//! point: retry wraps the operation, the retry chain is wrapped in the
//! named circuit breaker, and `NonRetryable` errors are excluded from both.

mod circuit_breaker;
mod error;
mod registry;
mod retry;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{Classify, ResilienceError};
pub use registry::ResilienceRegistry;
pub use retry::{BackoffStrategy, RetryPolicy};
