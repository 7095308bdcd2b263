//! Controller error model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// The completion future timed out before a `CompletionRecord` arrived.
    /// The corresponding entry is tagged orphaned.
    #[error("event {0} timed out waiting for completion")]
    Timeout(EventIdDisplay),

    /// The pending-future table lost the sender before completion arrived —
    /// only possible if the controller itself was dropped mid-flight.
    #[error("event {0} completion channel was dropped")]
    ChannelClosed(EventIdDisplay),
}

/// Wraps `gridflow_core::EventId` so it can appear in a `thiserror` message
/// without pulling a `Display` bound onto the enum's derive macros.
pub type EventIdDisplay = String;

impl From<ControllerError> for gridflow_core::FrameworkError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::Timeout(id) => gridflow_core::FrameworkError::Timeout(format!("controller: {id}")),
            ControllerError::ChannelClosed(id) => gridflow_core::FrameworkError::GridUnavailable(format!("controller: {id}")),
        }
    }
}
