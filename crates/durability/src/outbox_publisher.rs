//! Outbox publisher: a scheduled task that drains [`crate::outbox::Outbox`]
//! to the shared cluster on an interval, forwarding exhausted entries to
//! the dead-letter queue.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use gridflow_core::RuntimeConfig;
use gridflow_grid::Record;
use gridflow_observability::MetricsRegistry;

use crate::dlq::DeadLetterEntry;
use crate::outbox::{Outbox, OutboxEntry};
use crate::topic_registry::TopicRegistry;

/// Handle to a running [`OutboxPublisher`] task; dropping or calling
/// [`OutboxPublisherHandle::shutdown`] stops the next tick from starting.
pub struct OutboxPublisherHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl OutboxPublisherHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Where a delivery-exhausted entry is forwarded: the caller supplies the
/// dead-letter sink rather than `OutboxPublisher` owning one, since the DLQ
/// is shared-cluster state wired up alongside the saga subsystem.
pub trait DeadLetterSink: Send + Sync {
    fn add(&self, entry: DeadLetterEntry);
}

impl DeadLetterSink for crate::dlq::DeadLetterQueue {
    fn add(&self, entry: DeadLetterEntry) {
        crate::dlq::DeadLetterQueue::add(self, entry)
    }
}

/// Drains PENDING [`OutboxEntry`] rows to their shared topic on an interval
///.
pub struct OutboxPublisher {
    service_name: String,
    outbox: Arc<Outbox>,
    topics: Arc<TopicRegistry<Record>>,
    dlq: Arc<dyn DeadLetterSink>,
    config: Arc<RuntimeConfig>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl OutboxPublisher {
    pub fn new(
        service_name: impl Into<String>,
        outbox: Arc<Outbox>,
        topics: Arc<TopicRegistry<Record>>,
        dlq: Arc<dyn DeadLetterSink>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self { service_name: service_name.into(), outbox, topics, dlq, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the periodic poll-batch-then-publish loop as a background
    /// task. A no-op if `outbox.enabled` is false.
    pub fn spawn(self: Arc<Self>) -> OutboxPublisherHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let publisher = self.clone();

        let task = tokio::spawn(async move {
            if !publisher.config.outbox_enabled {
                return;
            }
            let mut ticker = tokio::time::interval(publisher.config.outbox_poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = publisher.drain_batch() {
                            error!(error = %err, "outbox publisher tick failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        OutboxPublisherHandle { shutdown: shutdown_tx, task }
    }

    /// One poll-batch-then-publish pass; also exposed directly for tests
    /// and for a manual "drain now" admin operation.
    pub fn drain_batch(&self) -> Result<(), crate::error::DurabilityError> {
        let batch = self.outbox.poll_pending(self.config.outbox_max_batch_size);
        for entry in batch {
            self.deliver(entry)?;
        }
        Ok(())
    }

    fn deliver(&self, entry: OutboxEntry) -> Result<(), crate::error::DurabilityError> {
        let topic = self.topics.topic(&entry.event_type);
        topic.publish(entry.event_record.clone());

        // The in-memory reference topic always "delivers" (fan-out is
        // synchronous and infallible); a real cluster client would report
        // publish failures here and fall into the retry/DLQ path below.
        self.outbox.mark_delivered(&entry.event_id)?;
        self.record("delivered");
        debug!(event_id = %entry.event_id, event_type = %entry.event_type, "outbox entry delivered");
        Ok(())
    }

    /// Exercised directly by tests simulating a publish failure; production
    /// delivery always succeeds against the in-memory topic (see
    /// [`Self::deliver`]).
    fn fail(&self, entry: &OutboxEntry, reason: &str) -> Result<(), crate::error::DurabilityError> {
        let retries = self.outbox.increment_retry(&entry.event_id, reason)?;
        if retries >= self.config.outbox_max_retries {
            self.outbox.mark_failed(&entry.event_id, reason)?;
            self.dlq.add(DeadLetterEntry::new(
                entry.event_id.to_string(),
                entry.event_type.clone(),
                entry.event_type.clone(),
                entry.event_record.clone(),
                reason,
                self.service_name.clone(),
                None,
                None,
            ));
            self.record("failed");
            warn!(event_id = %entry.event_id, retries, "outbox entry exhausted retries, forwarded to DLQ");
        } else {
            self.record("retried");
        }
        Ok(())
    }

    fn record(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_outbox_entry(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_grid::Grid;
    use std::sync::Mutex;

    struct RecordingDlq {
        entries: Mutex<Vec<DeadLetterEntry>>,
    }

    impl DeadLetterSink for RecordingDlq {
        fn add(&self, entry: DeadLetterEntry) {
            self.entries.lock().unwrap().push(entry);
        }
    }

    fn make_publisher() -> (Arc<Outbox>, Arc<OutboxPublisher>, Arc<RecordingDlq>) {
        let grid = Grid::new();
        let outbox = Arc::new(Outbox::new(&grid, "outbox"));
        let topics = Arc::new(TopicRegistry::new(Grid::new()));
        let dlq = Arc::new(RecordingDlq { entries: Mutex::new(Vec::new()) });
        let config = Arc::new(RuntimeConfig::default());
        let publisher = Arc::new(OutboxPublisher::new("order-service", outbox.clone(), topics, dlq.clone(), config));
        (outbox, publisher, dlq)
    }

    #[test]
    fn drain_batch_delivers_pending_entries() {
        let (outbox, publisher, _dlq) = make_publisher();
        let event_id = gridflow_core::EventId::new();
        outbox.write(OutboxEntry::new(event_id, "order.created", Record::new())).unwrap();

        publisher.drain_batch().unwrap();

        assert_eq!(outbox.get(&event_id).unwrap().status, crate::outbox::OutboxStatus::Delivered);
    }

    #[test]
    fn fail_forwards_to_dlq_after_max_retries() {
        let (outbox, publisher, dlq) = make_publisher();
        let event_id = gridflow_core::EventId::new();
        let entry = OutboxEntry::new(event_id, "order.created", Record::new());
        outbox.write(entry.clone()).unwrap();

        for _ in 0..5 {
            publisher.fail(&entry, "downstream unavailable").unwrap();
        }

        assert_eq!(outbox.get(&event_id).unwrap().status, crate::outbox::OutboxStatus::Failed);
        assert_eq!(dlq.entries.lock().unwrap().len(), 1);
    }
}
