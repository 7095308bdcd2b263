//! Saga error model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SagaError {
    #[error("saga {0} not found")]
    NotFound(String),

    #[error("saga {0} already exists")]
    AlreadyExists(String),

    #[error("CAS update for saga {0} was rejected by a concurrent writer")]
    Conflict(String),

    #[error("saga {saga_id} step mismatch: expected {expected}, got {actual}")]
    StepMismatch { saga_id: String, expected: String, actual: String },

    #[error("saga {0} step action failed: {1}")]
    StepFailed(String, String),

    /// A business-rule violation (e.g. insufficient stock), never retried
    /// and never counted toward opening the named circuit breaker.
    #[error("non-retryable step failure: {0}")]
    NonRetryable(String),

    #[error("saga {0} compensation failed: {1}")]
    CompensationFailed(String, String),

    #[error("saga {0} step timed out")]
    StepTimeout(String),
}

impl From<SagaError> for gridflow_core::FrameworkError {
    fn from(err: SagaError) -> Self {
        match err {
            SagaError::StepTimeout(ref id) => gridflow_core::FrameworkError::Timeout(format!("saga {id}")),
            SagaError::CompensationFailed(ref id, ref reason) => {
                gridflow_core::FrameworkError::CompensationFailed(format!("{id}: {reason}"))
            }
            SagaError::StepMismatch { .. } | SagaError::AlreadyExists(_) | SagaError::NotFound(_) => {
                gridflow_core::FrameworkError::InvalidSagaTransition(err.to_string())
            }
            SagaError::Conflict(_) | SagaError::StepFailed(_, _) => gridflow_core::FrameworkError::GridUnavailable(err.to_string()),
            SagaError::NonRetryable(ref reason) => gridflow_core::FrameworkError::NonRetryable(reason.clone()),
        }
    }
}
