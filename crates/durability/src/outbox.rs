//! Outbox: producer-side guaranteed delivery for cross-cluster publication.
//!
//! The outbox map is LOCAL and written only by the owning service, so
//! transitions use the grid's partition-local `process()` rather than
//! cross-service CAS.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::EventId;
use gridflow_grid::{Grid, InMemoryKeyedMap, KeyedMap, MapSpace, Record};

use crate::error::DurabilityError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Delivered,
    Failed,
}

/// A durable, producer-side record of one event pending cross-cluster
/// publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub event_id: EventId,
    pub event_type: String,
    pub event_record: Record,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl OutboxEntry {
    pub fn new(event_id: EventId, event_type: impl Into<String>, event_record: Record) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            event_record,
            status: OutboxStatus::Pending,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            failure_reason: None,
        }
    }
}

/// Producer-side durable outbox.
pub struct Outbox {
    map: std::sync::Arc<InMemoryKeyedMap<EventId, OutboxEntry>>,
}

impl Outbox {
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self { map: grid.keyed_map(MapSpace::Local, space_name) }
    }

    /// Append an entry to the LOCAL outbox map, same colocation scope as the
    /// pipeline's COMPLETION write.
    pub fn write(&self, entry: OutboxEntry) -> Result<(), DurabilityError> {
        self.map.put(entry.event_id, entry);
        Ok(())
    }

    /// `status == PENDING`, ordered by `createdAt`, limited to `batch`
    ///.
    pub fn poll_pending(&self, batch: usize) -> Vec<OutboxEntry> {
        let page = gridflow_grid::query(
            self.map.as_ref(),
            |entry: &OutboxEntry| entry.status == OutboxStatus::Pending,
            |entry: &OutboxEntry| entry.created_at,
            0,
            batch,
        );
        page.items
    }

    pub fn mark_delivered(&self, event_id: &EventId) -> Result<(), DurabilityError> {
        self.transition(event_id, |entry| {
            entry.status = OutboxStatus::Delivered;
            entry.last_attempt_at = Some(Utc::now());
        })
    }

    pub fn increment_retry(&self, event_id: &EventId, reason: impl Into<String>) -> Result<u32, DurabilityError> {
        let mut new_count = 0;
        self.transition(event_id, |entry| {
            entry.retry_count += 1;
            entry.last_attempt_at = Some(Utc::now());
            entry.failure_reason = Some(reason.into());
            new_count = entry.retry_count;
        })?;
        Ok(new_count)
    }

    pub fn mark_failed(&self, event_id: &EventId, reason: impl Into<String>) -> Result<(), DurabilityError> {
        self.transition(event_id, |entry| {
            entry.status = OutboxStatus::Failed;
            entry.last_attempt_at = Some(Utc::now());
            entry.failure_reason = Some(reason.into());
        })
    }

    pub fn get(&self, event_id: &EventId) -> Option<OutboxEntry> {
        self.map.get(event_id)
    }

    fn transition(&self, event_id: &EventId, mutate: impl FnOnce(&mut OutboxEntry)) -> Result<(), DurabilityError> {
        let key = *event_id;
        let mut found = false;
        self.map.process(
            &key,
            Box::new(|current| {
                current.map(|mut entry| {
                    mutate(&mut entry);
                    found = true;
                    entry
                })
            }),
        );
        if found { Ok(()) } else { Err(DurabilityError::OutboxEntryNotFound(event_id.to_string())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_pending_orders_by_created_at_and_respects_batch() {
        let grid = Grid::new();
        let outbox = Outbox::new(&grid, "outbox");

        for i in 0..5 {
            let mut entry = OutboxEntry::new(EventId::new(), "order.created", Record::new());
            entry.created_at = Utc::now() + chrono::Duration::seconds(i);
            outbox.write(entry).unwrap();
        }

        let page = outbox.poll_pending(3);
        assert_eq!(page.len(), 3);
        assert!(page[0].created_at <= page[1].created_at);
    }

    #[test]
    fn mark_delivered_transitions_status() {
        let grid = Grid::new();
        let outbox = Outbox::new(&grid, "outbox");
        let event_id = EventId::new();
        outbox.write(OutboxEntry::new(event_id, "order.created", Record::new())).unwrap();

        outbox.mark_delivered(&event_id).unwrap();
        assert_eq!(outbox.get(&event_id).unwrap().status, OutboxStatus::Delivered);
    }

    #[test]
    fn increment_retry_then_mark_failed() {
        let grid = Grid::new();
        let outbox = Outbox::new(&grid, "outbox");
        let event_id = EventId::new();
        outbox.write(OutboxEntry::new(event_id, "order.created", Record::new())).unwrap();

        let count = outbox.increment_retry(&event_id, "transient").unwrap();
        assert_eq!(count, 1);

        outbox.mark_failed(&event_id, "max retries exceeded").unwrap();
        let entry = outbox.get(&event_id).unwrap();
        assert_eq!(entry.status, OutboxStatus::Failed);
        assert_eq!(entry.failure_reason.as_deref(), Some("max retries exceeded"));
    }
}
