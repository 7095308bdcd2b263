//! Cross-cluster durability: outbox, dead-letter queue, idempotency guard
//!.
//!
//! Producer-side delivery (outbox) and consumer-side dedupe/failure capture
//! (idempotency guard, DLQ) are kept in one crate because they share the
//! same shared-cluster colocation story and are wired up together at
//! service startup.

mod dlq;
mod error;
mod idempotency;
mod outbox;
mod outbox_publisher;
mod topic_registry;

pub use dlq::{DeadLetterEntry, DeadLetterQueue, DlqStatus};
pub use error::DurabilityError;
pub use idempotency::IdempotencyGuard;
pub use outbox::{Outbox, OutboxEntry, OutboxStatus};
pub use outbox_publisher::{DeadLetterSink, OutboxPublisher, OutboxPublisherHandle};
pub use topic_registry::TopicRegistry;
