//! Completion record: the pipeline's terminal artifact for one event,
//! written exactly once per traversal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::{CompositeEventKey, EventId};

/// Stage timestamps plus outcome for one event's pipeline traversal.
///
/// `COMPLETION[eventId]` is written at most once per event; the controller's future resolves with a clone of this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord<K> {
    pub event_id: EventId,
    pub seq_key: CompositeEventKey<K>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub persisted_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    pub failure_reason: Option<String>,
}

impl<K> CompletionRecord<K> {
    pub fn success(
        event_id: EventId,
        seq_key: CompositeEventKey<K>,
        submitted_at: Option<DateTime<Utc>>,
        persisted_at: DateTime<Utc>,
        applied_at: DateTime<Utc>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id,
            seq_key,
            submitted_at,
            persisted_at: Some(persisted_at),
            applied_at: Some(applied_at),
            published_at: Some(published_at),
            completed_at: Utc::now(),
            success: true,
            failure_reason: None,
        }
    }

    pub fn failure(
        event_id: EventId,
        seq_key: CompositeEventKey<K>,
        submitted_at: Option<DateTime<Utc>>,
        persisted_at: Option<DateTime<Utc>>,
        applied_at: Option<DateTime<Utc>>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_id,
            seq_key,
            submitted_at,
            persisted_at,
            applied_at,
            published_at: None,
            completed_at: Utc::now(),
            success: false,
            failure_reason: Some(reason.into()),
        }
    }
}
