//! In-process table of pending completion futures, keyed by event id.
//!
//! A typed `tokio::sync::oneshot` channel per event, stored in a plain
//! `Mutex<HashMap<...>>` rather than an external concurrent-map crate.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use gridflow_core::EventId;
use gridflow_pipeline::CompletionRecord;

pub struct PendingTable<K> {
    senders: Mutex<HashMap<EventId, oneshot::Sender<CompletionRecord<K>>>>,
}

impl<K> PendingTable<K> {
    pub fn new() -> Self {
        Self { senders: Mutex::new(HashMap::new()) }
    }

    /// Register a new pending future, returning the receiver half.
    pub fn register(&self, event_id: EventId) -> oneshot::Receiver<CompletionRecord<K>> {
        let (tx, rx) = oneshot::channel();
        self.senders.lock().expect("pending table lock poisoned").insert(event_id, tx);
        rx
    }

    /// Resolve a pending future, if one is still registered. Returns `false`
    /// if the event id is unknown — either it already completed, timed out
    /// and was reaped, or was never submitted through this controller.
    pub fn resolve(&self, event_id: EventId, record: CompletionRecord<K>) -> bool {
        let sender = self.senders.lock().expect("pending table lock poisoned").remove(&event_id);
        match sender {
            Some(sender) => sender.send(record).is_ok(),
            None => false,
        }
    }

    /// Drop a pending entry without resolving it — called after a timeout
    /// fires so a late completion doesn't find a stale sender.
    pub fn reap(&self, event_id: &EventId) {
        self.senders.lock().expect("pending table lock poisoned").remove(event_id);
    }
}

impl<K> Default for PendingTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_core::{CompositeEventKey, SequenceNumber};

    #[tokio::test]
    async fn resolve_delivers_the_record_to_the_registered_receiver() {
        let table: PendingTable<String> = PendingTable::new();
        let event_id = EventId::new();
        let rx = table.register(event_id);

        let seq_key = CompositeEventKey::new(SequenceNumber::new(1), "order-1".to_string());
        let record = CompletionRecord::success(event_id, seq_key, None, chrono::Utc::now(), chrono::Utc::now(), chrono::Utc::now());
        assert!(table.resolve(event_id, record.clone()));

        let received = rx.await.unwrap();
        assert_eq!(received.event_id, record.event_id);
    }

    #[test]
    fn resolve_returns_false_for_an_unknown_event() {
        let table: PendingTable<String> = PendingTable::new();
        let seq_key = CompositeEventKey::new(SequenceNumber::new(1), "order-1".to_string());
        let record = CompletionRecord::success(EventId::new(), seq_key, None, chrono::Utc::now(), chrono::Utc::now(), chrono::Utc::now());
        assert!(!table.resolve(EventId::new(), record));
    }
}
