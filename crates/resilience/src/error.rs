//! Error classification and the resilience wrapper's own error type
//!.

use thiserror::Error;

use gridflow_core::FrameworkError;

/// Whether an error must never be retried or counted by a circuit breaker
///.
pub trait Classify {
    fn is_non_retryable(&self) -> bool;
}

impl Classify for FrameworkError {
    fn is_non_retryable(&self) -> bool {
        FrameworkError::is_non_retryable(self)
    }
}

/// Error surfaced by [`crate::ResilienceRegistry::execute`]: either the
/// wrapped operation's own error (possibly after exhausting retries), or a
/// rejection from the circuit breaker itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResilienceError<E> {
    /// The named circuit breaker is OPEN; the call was rejected before the
    /// operation ran.
    #[error("circuit '{0}' is open")]
    CircuitOpen(String),

    /// The operation failed and either was not retried (non-retryable) or
    /// exhausted its retry budget.
    #[error("operation failed: {0:?}")]
    OperationFailed(E),
}

impl<E> ResilienceError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            ResilienceError::OperationFailed(err) => Some(err),
            ResilienceError::CircuitOpen(_) => None,
        }
    }
}
