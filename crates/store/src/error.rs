use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("grid unavailable: {0}")]
    GridUnavailable(String),

    #[error("no view updater named '{0}' is registered")]
    UnknownUpdater(String),
}

impl From<gridflow_grid::GridError> for StoreError {
    fn from(err: gridflow_grid::GridError) -> Self {
        StoreError::GridUnavailable(err.to_string())
    }
}

impl From<StoreError> for gridflow_core::FrameworkError {
    fn from(err: StoreError) -> Self {
        gridflow_core::FrameworkError::GridUnavailable(err.to_string())
    }
}
