//! Durability-layer error model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurabilityError {
    #[error("no outbox entry for event {0}")]
    OutboxEntryNotFound(String),

    #[error("no dead-letter entry with id {0}")]
    DeadLetterEntryNotFound(String),

    #[error("dead-letter entry {0} is already in a terminal status")]
    DeadLetterEntryNotPending(String),

    #[error("underlying grid operation failed: {0}")]
    Grid(String),
}

impl From<gridflow_grid::GridError> for DurabilityError {
    fn from(err: gridflow_grid::GridError) -> Self {
        DurabilityError::Grid(err.to_string())
    }
}
