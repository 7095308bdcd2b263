//! Dead-letter queue: consumer-side capture of events that exhausted retry.
//!
//! Unlike the outbox, the DLQ lives on the SHARED cluster, so other
//! services' operators can list and replay entries that were never this
//! process's own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridflow_grid::{Grid, InMemoryKeyedMap, KeyedMap, MapSpace, PubSubTopic, Record};

use crate::error::DurabilityError;

/// Lifecycle status of one dead-letter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DlqStatus {
    Pending,
    Replayed,
    Discarded,
}

/// A captured failure: an event a listener could not process after
/// exhausting retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub dlq_id: Uuid,
    pub original_event_id: String,
    pub event_type: String,
    pub topic_name: String,
    pub event_record: Record,
    pub failure_reason: String,
    pub failure_timestamp: DateTime<Utc>,
    pub source_service: String,
    pub saga_id: Option<String>,
    pub correlation_id: Option<String>,
    pub replay_count: u32,
    pub status: DlqStatus,
}

impl DeadLetterEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        original_event_id: impl Into<String>,
        event_type: impl Into<String>,
        topic_name: impl Into<String>,
        event_record: Record,
        failure_reason: impl Into<String>,
        source_service: impl Into<String>,
        saga_id: Option<String>,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            dlq_id: Uuid::now_v7(),
            original_event_id: original_event_id.into(),
            event_type: event_type.into(),
            topic_name: topic_name.into(),
            event_record,
            failure_reason: failure_reason.into(),
            failure_timestamp: Utc::now(),
            source_service: source_service.into(),
            saga_id,
            correlation_id,
            replay_count: 0,
            status: DlqStatus::Pending,
        }
    }
}

const RETENTION: std::time::Duration = std::time::Duration::from_secs(7 * 24 * 60 * 60);

/// Shared-cluster dead-letter queue.
///
/// `replay` needs a handle to whichever shared topic the original event
/// would have been published on, so the caller supplies a topic lookup
/// rather than the DLQ owning every possible topic itself. Entries are
/// retained through their full 7-day TTL regardless of status, so an
/// operator can audit what was replayed or discarded until the entry
/// ages out.
pub struct DeadLetterQueue {
    map: std::sync::Arc<InMemoryKeyedMap<Uuid, DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self { map: grid.keyed_map(MapSpace::Shared, space_name) }
    }

    pub fn add(&self, entry: DeadLetterEntry) {
        self.map.put_with_ttl(entry.dlq_id, entry, RETENTION);
    }

    pub fn get(&self, id: &Uuid) -> Option<DeadLetterEntry> {
        self.map.get(id)
    }

    /// Most recently added first, capped at `limit`.
    pub fn list(&self, limit: usize) -> Vec<DeadLetterEntry> {
        let page = gridflow_grid::query(
            self.map.as_ref(),
            |_: &DeadLetterEntry| true,
            |e: &DeadLetterEntry| std::cmp::Reverse(e.failure_timestamp),
            0,
            limit,
        );
        page.items
    }

    /// Transitions a still-pending entry to DISCARDED. The entry is kept
    /// (not removed) so it remains visible to `get`/`list` until its TTL
    /// expires.
    pub fn discard(&self, id: &Uuid) -> Result<DeadLetterEntry, DurabilityError> {
        self.transition(id, DlqStatus::Discarded)
    }

    /// Publishes the stored `event_record` back to `topic_name` and marks
    /// the entry REPLAYED, bumping `replay_count`.
    pub fn replay(&self, id: &Uuid, topic: &PubSubTopic<Record>) -> Result<DeadLetterEntry, DurabilityError> {
        let entry = self.get(id).ok_or_else(|| DurabilityError::DeadLetterEntryNotFound(id.to_string()))?;
        if entry.status != DlqStatus::Pending {
            return Err(DurabilityError::DeadLetterEntryNotPending(id.to_string()));
        }
        topic.publish(entry.event_record.clone());

        let mut updated = entry;
        updated.status = DlqStatus::Replayed;
        updated.replay_count += 1;
        self.map.put_with_ttl(*id, updated.clone(), RETENTION);
        Ok(updated)
    }

    fn transition(&self, id: &Uuid, status: DlqStatus) -> Result<DeadLetterEntry, DurabilityError> {
        let entry = self.get(id).ok_or_else(|| DurabilityError::DeadLetterEntryNotFound(id.to_string()))?;
        if entry.status != DlqStatus::Pending {
            return Err(DurabilityError::DeadLetterEntryNotPending(id.to_string()));
        }
        let mut updated = entry;
        updated.status = status;
        self.map.put_with_ttl(*id, updated.clone(), RETENTION);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(record: Record) -> DeadLetterEntry {
        DeadLetterEntry::new("evt-1", "order.created", "orders", record, "max retries exceeded", "order-service", None, None)
    }

    #[test]
    fn add_then_get_roundtrips() {
        let grid = Grid::new();
        let dlq = DeadLetterQueue::new(&grid, "dlq");
        let e = entry(Record::new());
        let id = e.dlq_id;
        dlq.add(e);

        let fetched = dlq.get(&id).unwrap();
        assert_eq!(fetched.original_event_id, "evt-1");
        assert_eq!(fetched.status, DlqStatus::Pending);
    }

    #[test]
    fn discard_marks_discarded_without_removing_the_entry() {
        let grid = Grid::new();
        let dlq = DeadLetterQueue::new(&grid, "dlq");
        let e = entry(Record::new());
        let id = e.dlq_id;
        dlq.add(e);

        let discarded = dlq.discard(&id).unwrap();
        assert_eq!(discarded.status, DlqStatus::Discarded);
        assert_eq!(dlq.get(&id).unwrap().status, DlqStatus::Discarded);
        assert!(matches!(dlq.discard(&id), Err(DurabilityError::DeadLetterEntryNotPending(_))));
    }

    #[test]
    fn replay_publishes_to_topic_and_marks_replayed() {
        let grid = Grid::new();
        let dlq = DeadLetterQueue::new(&grid, "dlq");
        let record = Record::new().set("order_id", "order-1");
        let e = entry(record.clone());
        let id = e.dlq_id;
        dlq.add(e);

        let topic: PubSubTopic<Record> = PubSubTopic::new("orders");
        let sub = topic.subscribe();
        let replayed = dlq.replay(&id, &topic).unwrap();

        assert_eq!(sub.recv().unwrap(), record);
        assert_eq!(replayed.status, DlqStatus::Replayed);
        assert_eq!(replayed.replay_count, 1);
        assert!(matches!(dlq.replay(&id, &topic), Err(DurabilityError::DeadLetterEntryNotPending(_))));
    }
}
