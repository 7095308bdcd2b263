//! The event-sourcing pipeline: PERSIST → APPLY → PUBLISH → COMPLETE.
//!
//! Each service embeds one `Pipeline` per domain type, run off a bounded
//! pending map plus change journal, with cross-cluster republish via the
//! outbox for saga-participating events.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use gridflow_core::{CompositeEventKey, EventId, RuntimeConfig};
use gridflow_durability::{Outbox, OutboxEntry};
use gridflow_events::EventEnvelope;
use gridflow_grid::{ChangeJournal, Grid, InMemoryKeyedMap, KeyedMap, MapSpace, Record};
use gridflow_observability::MetricsRegistry;
use gridflow_store::{EventStore, ViewStore, ViewUpdaterRegistry};

use crate::bus_registry::BusRegistry;
use crate::completion::CompletionRecord;
use crate::error::PipelineError;

/// One service's embedded pipeline for domain type `D` with key `K`, event
/// base `E`, and view type `V`.
pub struct Pipeline<K, E, V> {
    domain: String,
    view_updater_name: String,

    pending: Arc<InMemoryKeyedMap<EventId, EventEnvelope<K, E>>>,
    pending_journal: Arc<ChangeJournal<EventId, EventEnvelope<K, E>>>,

    event_store: Arc<EventStore<K, E>>,
    view_store: Arc<ViewStore<K, V>>,
    view_updaters: Arc<ViewUpdaterRegistry<K, E, V>>,

    bus: Arc<BusRegistry<EventEnvelope<K, E>>>,
    completion: Arc<InMemoryKeyedMap<EventId, CompletionRecord<K>>>,

    outbox: Option<Arc<Outbox>>,
    metrics: Option<Arc<MetricsRegistry>>,
    config: Arc<RuntimeConfig>,
}

impl<K, E, V> Pipeline<K, E, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(grid: &Grid, domain: impl Into<String>, view_updater_name: impl Into<String>, config: Arc<RuntimeConfig>) -> Self {
        Self {
            domain: domain.into(),
            view_updater_name: view_updater_name.into(),
            pending: grid.keyed_map(MapSpace::Local, "pending"),
            pending_journal: grid.change_journal(),
            event_store: Arc::new(EventStore::new(grid, "events")),
            view_store: Arc::new(ViewStore::new(grid, "views")),
            view_updaters: Arc::new(ViewUpdaterRegistry::new()),
            bus: Arc::new(BusRegistry::new()),
            completion: grid.keyed_map(MapSpace::Local, "completion"),
            outbox: None,
            metrics: None,
            config,
        }
    }

    pub fn with_outbox(mut self, outbox: Arc<Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn view_updaters(&self) -> &Arc<ViewUpdaterRegistry<K, E, V>> {
        &self.view_updaters
    }

    pub fn event_store(&self) -> &Arc<EventStore<K, E>> {
        &self.event_store
    }

    pub fn view_store(&self) -> &Arc<ViewStore<K, V>> {
        &self.view_store
    }

    pub fn bus(&self) -> &Arc<BusRegistry<EventEnvelope<K, E>>> {
        &self.bus
    }

    pub fn completion_map(&self) -> &Arc<InMemoryKeyedMap<EventId, CompletionRecord<K>>> {
        &self.completion
    }

    pub fn pending_journal(&self) -> &Arc<ChangeJournal<EventId, EventEnvelope<K, E>>> {
        &self.pending_journal
    }

    /// Stage an envelope: write to PENDING and record the change on the
    /// journal the pipeline workers consume from.
    pub fn submit(&self, envelope: EventEnvelope<K, E>) {
        let event_id = envelope.event_id();
        self.pending.put(event_id, envelope.clone());
        self.pending_journal.record(gridflow_grid::EntryChange { key: event_id, old: None, new: Some(envelope) });
    }

    /// Run the four stages for one event synchronously, write the
    /// completion record, and clear PENDING. Exposed directly so tests (and
    /// a single-threaded demo) can drive the pipeline without the worker
    /// pool.
    pub fn process_one(&self, event_id: EventId, envelope: EventEnvelope<K, E>) -> CompletionRecord<K>
    where
        K: PartialEq,
    {
        let entity_key = envelope.entity_key().clone();
        let submitted_at = envelope.submitted_at();

        let record = match self.persist(entity_key.clone(), envelope.clone()) {
            Err(err) => self.fail(event_id, entity_key, None, submitted_at, None, None, err),
            Ok(seq_key) => {
                let persisted_at = Utc::now();
                match self.apply(&entity_key, &envelope) {
                    Err(err) => self.fail(event_id, entity_key, Some(seq_key), submitted_at, Some(persisted_at), None, err),
                    Ok(()) => {
                        let applied_at = Utc::now();
                        match self.publish(&envelope) {
                            Err(err) => self.fail(
                                event_id,
                                entity_key,
                                Some(seq_key),
                                submitted_at,
                                Some(persisted_at),
                                Some(applied_at),
                                err,
                            ),
                            Ok(()) => {
                                let published_at = Utc::now();
                                self.republish_if_saga_participant(&envelope);
                                CompletionRecord::success(event_id, seq_key, submitted_at, persisted_at, applied_at, published_at)
                            }
                        }
                    }
                }
            }
        };

        self.completion.put(event_id, record.clone());
        self.pending.remove(&event_id);
        record
    }

    fn persist(&self, entity_key: K, envelope: EventEnvelope<K, E>) -> Result<CompositeEventKey<K>, PipelineError> {
        self.event_store.append(entity_key, envelope).map_err(|e| PipelineError::Persist(e.to_string()))
    }

    fn apply(&self, entity_key: &K, envelope: &EventEnvelope<K, E>) -> Result<(), PipelineError>
    where
        K: PartialEq,
    {
        self.view_store
            .apply_event(entity_key, envelope, &self.view_updater_name, &self.view_updaters)
            .map(|_| ())
            .map_err(|e| PipelineError::Apply(e.to_string()))
    }

    fn publish(&self, envelope: &EventEnvelope<K, E>) -> Result<(), PipelineError> {
        self.bus.publish(envelope.event_type(), envelope.clone());
        Ok(())
    }

    /// Cross-cluster republish for saga-participating events. The outbox append itself never fails
    /// the pipeline stage, it's best-effort logging only: delivery to the
    /// shared cluster is at-least-once, not exactly-once.
    fn republish_if_saga_participant(&self, envelope: &EventEnvelope<K, E>)
    where
        E: serde::Serialize,
        K: serde::Serialize,
    {
        let Some(outbox) = &self.outbox else { return };
        if !envelope.is_saga_participant() {
            return;
        }
        let record = envelope_to_record(envelope);
        let entry = OutboxEntry::new(envelope.event_id(), envelope.event_type(), record);
        if let Err(err) = outbox.write(entry) {
            error!(event_id = %envelope.event_id(), error = %err, "outbox append failed");
        }
    }

    fn fail(
        &self,
        event_id: EventId,
        entity_key: K,
        seq_key: Option<CompositeEventKey<K>>,
        submitted_at: Option<chrono::DateTime<Utc>>,
        persisted_at: Option<chrono::DateTime<Utc>>,
        applied_at: Option<chrono::DateTime<Utc>>,
        err: PipelineError,
    ) -> CompletionRecord<K> {
        warn!(event_id = %event_id, stage = err.stage(), error = %err, "pipeline stage failed");
        if let Some(metrics) = &self.metrics {
            metrics.record_pipeline_event("failed", &self.domain);
        }
        // PERSIST failures never minted a real sequence number; a sentinel
        // of -1 keeps `seq_key` non-optional on `CompletionRecord` without
        // requiring `K: Default`.
        let seq_key = seq_key.unwrap_or_else(|| CompositeEventKey::new(gridflow_core::SequenceNumber::new(-1), entity_key));
        CompletionRecord::failure(event_id, seq_key, submitted_at, persisted_at, applied_at, err.to_string())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn config(&self) -> &Arc<RuntimeConfig> {
        &self.config
    }
}

/// Serialize an envelope to the wire record crossing the shared cluster
///: every header field at the top level (the `saga` flatten
/// already handles saga metadata), plus the payload's own fields merged in
/// so a remote listener can read `record.get_str("sku")` directly instead
/// of reaching through an externally-tagged enum wrapper.
fn envelope_to_record<K, E>(envelope: &EventEnvelope<K, E>) -> Record
where
    E: serde::Serialize,
    K: serde::Serialize,
{
    let Ok(serde_json::Value::Object(mut map)) = serde_json::to_value(envelope) else {
        return Record::new();
    };
    if let Some(payload) = map.remove("payload") {
        if let Some(serde_json::Value::Object(fields)) = unwrap_single_variant(payload) {
            map.extend(fields);
        }
    }
    Record::from(map.into_iter().collect::<std::collections::BTreeMap<_, _>>())
}

/// Externally-tagged enum payloads serialize as `{"VariantName": {...}}`;
/// unwrap that single entry so its fields land at the top level. Anything
/// else (a struct payload with no variant wrapper) passes through as-is.
fn unwrap_single_variant(value: serde_json::Value) -> Option<serde_json::Value> {
    match value {
        serde_json::Value::Object(obj) if obj.len() == 1 => obj.into_values().next(),
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_events::SagaMetadata;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    enum DemoEvent {
        Created { sku: String, quantity: u32 },
    }

    #[test]
    fn envelope_to_record_flattens_header_and_payload_fields() {
        let envelope = EventEnvelope::new("Created", 1, "inventory-service", "order-1".to_string(), DemoEvent::Created {
            sku: "widget".to_string(),
            quantity: 3,
        })
        .with_saga_metadata(SagaMetadata { saga_id: "saga-1".to_string(), saga_type: "OrderFulfillment".to_string(), step_number: 1, is_compensating: false });

        let record = envelope_to_record(&envelope);

        assert_eq!(record.get_str("saga_id"), Some("saga-1"));
        assert_eq!(record.get_str("sku"), Some("widget"));
        assert_eq!(record.get("quantity").and_then(|v| v.as_u64()), Some(3));
        assert!(record.get("payload").is_none());
    }
}
