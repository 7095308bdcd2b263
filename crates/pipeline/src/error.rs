//! Pipeline-stage error model.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("PERSIST stage failed: {0}")]
    Persist(String),

    #[error("APPLY stage failed: {0}")]
    Apply(String),

    #[error("PUBLISH stage failed: {0}")]
    Publish(String),

    #[error("outbox append failed: {0}")]
    Outbox(String),
}

impl PipelineError {
    /// The stage tag used for `pipeline.stage.failures` metrics and log
    /// fields.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Persist(_) => "persist",
            PipelineError::Apply(_) => "apply",
            PipelineError::Publish(_) => "publish",
            PipelineError::Outbox(_) => "outbox",
        }
    }
}

impl From<PipelineError> for gridflow_core::FrameworkError {
    fn from(err: PipelineError) -> Self {
        gridflow_core::FrameworkError::GridUnavailable(err.to_string())
    }
}
