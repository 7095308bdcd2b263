//! The controller façade: the sole entry point for business code.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use gridflow_core::{EventId, RuntimeConfig, SequenceGenerator};
use gridflow_events::{EventEnvelope, SagaMetadata};
use gridflow_observability::MetricsRegistry;
use gridflow_pipeline::{CompletionRecord, Pipeline};

use crate::error::ControllerError;
use crate::pending::PendingTable;

/// Saga participation metadata supplied by the caller of `handle()`.
pub struct SagaHandleMetadata {
    pub saga_id: String,
    pub saga_type: String,
    pub step_number: u32,
    pub is_compensating: bool,
}

impl From<SagaHandleMetadata> for SagaMetadata {
    fn from(meta: SagaHandleMetadata) -> Self {
        SagaMetadata { saga_id: meta.saga_id, saga_type: meta.saga_type, step_number: meta.step_number, is_compensating: meta.is_compensating }
    }
}

/// The public entry point business code calls instead of touching the
/// pipeline or grid directly.
pub struct Controller<K, E, V> {
    pipeline: Arc<Pipeline<K, E, V>>,
    pending: Arc<PendingTable<K>>,
    sequence: SequenceGenerator,
    config: Arc<RuntimeConfig>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl<K, E, V> Controller<K, E, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Build a controller over `pipeline`, wiring a listener on its
    /// completion map that resolves pending futures.
    pub fn new(pipeline: Arc<Pipeline<K, E, V>>, config: Arc<RuntimeConfig>) -> Self {
        let pending: Arc<PendingTable<K>> = Arc::new(PendingTable::new());

        let listener_pending = pending.clone();
        pipeline.completion_map().listeners().register(move |change| {
            let Some(record) = change.new.clone() else { return };
            listener_pending.resolve(change.key, record);
        });

        Self { pipeline, pending, sequence: SequenceGenerator::new(), config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stamp metadata, assign a sequence number, register a pending future,
    /// stage the envelope, and await completion with a timeout.
    pub async fn handle(&self, mut envelope: EventEnvelope<K, E>, saga: Option<SagaHandleMetadata>) -> Result<CompletionRecord<K>, ControllerError> {
        let now = Utc::now();
        envelope = envelope.stamp_submission(now, now);
        if let Some(saga) = saga {
            envelope = envelope.with_saga_metadata(saga.into());
        }

        // seqKey itself is minted durably inside the pipeline's PERSIST stage
        // (`EventStore::append`); the generator here only orders staging
        // within this process, not the durable sequence.
        let _staging_order = self.sequence.next();

        let event_id = envelope.event_id();
        let receiver = self.pending.register(event_id);
        self.pipeline.submit(envelope);

        let timeout = self.config.controller_completion_timeout;
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(_)) => Err(ControllerError::ChannelClosed(event_id.to_string())),
            Err(_) => {
                self.pending.reap(&event_id);
                if let Some(metrics) = &self.metrics {
                    metrics.record_orphaned_completion();
                }
                Err(ControllerError::Timeout(event_id.to_string()))
            }
        }
    }

    pub fn completion_timeout(&self) -> Duration {
        self.config.controller_completion_timeout
    }

    pub fn pipeline(&self) -> &Arc<Pipeline<K, E, V>> {
        &self.pipeline
    }
}
