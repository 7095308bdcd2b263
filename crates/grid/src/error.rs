//! Grid-level error model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("key not found")]
    NotFound,

    #[error("CAS replace failed: expected value did not match current value")]
    CasMismatch,

    #[error("lock '{0}' timed out")]
    LockTimeout(String),

    #[error("no partition processor named '{0}' is registered")]
    UnknownProcessor(String),

    #[error("partition processor '{0}' failed: {1}")]
    ProcessorFailed(String, String),

    #[error("grid map space '{0}' does not exist")]
    UnknownMapSpace(String),

    #[error("grid is unavailable: {0}")]
    Unavailable(String),
}

impl From<GridError> for gridflow_core::FrameworkError {
    fn from(err: GridError) -> Self {
        match err {
            GridError::LockTimeout(_) => gridflow_core::FrameworkError::Timeout(err.to_string()),
            other => gridflow_core::FrameworkError::GridUnavailable(other.to_string()),
        }
    }
}
