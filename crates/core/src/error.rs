//! Domain and cross-cutting error models.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong in [`FrameworkError`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

/// Cross-cutting infrastructure error kinds.
///
/// These are the kinds the pipeline, controller, resilience layer and saga
/// subsystem surface to each other and to business code. Each variant's
/// propagation policy is documented on the variant itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameworkError {
    /// Underlying grid RPC failed. Retryable; propagates out of the pipeline
    /// stage that hit it and marks the `CompletionRecord` as failed.
    #[error("grid unavailable: {0}")]
    GridUnavailable(String),

    /// A controller future, saga step, or saga deadline timed out.
    /// Non-retryable from the caller's point of view.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The named circuit breaker is OPEN; the call failed fast.
    #[error("circuit open: {0}")]
    CircuitOpen(String),

    /// A business-rule violation that must never be retried and must never
    /// count toward opening a circuit breaker.
    #[error("non-retryable: {0}")]
    NonRetryable(String),

    /// The idempotency guard rejected a duplicate delivery.
    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    /// An operation was attempted against a terminal or unknown saga.
    #[error("invalid saga transition: {0}")]
    InvalidSagaTransition(String),

    /// A compensation step failed while reversing a saga.
    #[error("compensation failed: {0}")]
    CompensationFailed(String),
}

impl FrameworkError {
    /// Whether this error must never be retried or counted by a circuit
    /// breaker.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, FrameworkError::NonRetryable(_))
    }
}
