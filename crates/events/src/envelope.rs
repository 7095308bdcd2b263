//! The event envelope: the unit of persistence and transport for
//! every domain event moving through the pipeline.
//!
//! Envelopes separate infrastructure concerns (identity, ordering, saga
//! participation) from the domain payload. The payload is generic so the
//! same envelope shape carries both strongly-typed domain events (demo code,
//! tests) and the opaque JSON records that cross the grid's wire format
//!.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gridflow_core::EventId;

/// Saga participation metadata. Present only when the event is a step in a
/// saga; its absence is the guard choreographed saga listeners check
/// before reacting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaMetadata {
    pub saga_id: String,
    pub saga_type: String,
    pub step_number: u32,
    pub is_compensating: bool,
}

/// An event plus every piece of infrastructure metadata the pipeline,
/// controller, and saga subsystem need to move it through the system
///.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<K, E> {
    event_id: EventId,
    event_type: String,
    schema_version: u32,
    source_service: String,
    occurred_at: DateTime<Utc>,
    entity_key: K,
    correlation_id: Uuid,
    #[serde(flatten)]
    saga: Option<SagaMetadata>,
    submitted_at: Option<DateTime<Utc>>,
    pipeline_entry_at: Option<DateTime<Utc>>,
    payload: E,
}

impl<K, E> EventEnvelope<K, E> {
    /// Construct a new envelope with metadata left unstamped
    /// (`submitted_at`/`pipeline_entry_at` are `None`); the controller fills
    /// these in before staging.
    pub fn new(
        event_type: impl Into<String>,
        schema_version: u32,
        source_service: impl Into<String>,
        entity_key: K,
        payload: E,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            schema_version,
            source_service: source_service.into(),
            occurred_at: Utc::now(),
            entity_key,
            correlation_id: Uuid::now_v7(),
            saga: None,
            submitted_at: None,
            pipeline_entry_at: None,
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn source_service(&self) -> &str {
        &self.source_service
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn entity_key(&self) -> &K {
        &self.entity_key
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn saga(&self) -> Option<&SagaMetadata> {
        self.saga.as_ref()
    }

    /// Whether this event participates in a saga — the guard choreographed
    /// listeners check before reacting.
    pub fn is_saga_participant(&self) -> bool {
        self.saga.is_some()
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn pipeline_entry_at(&self) -> Option<DateTime<Utc>> {
        self.pipeline_entry_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Stamp saga metadata before staging, per the controller's
    /// saga-metadata guard.
    pub fn with_saga_metadata(mut self, saga: SagaMetadata) -> Self {
        self.saga = Some(saga);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Stamp `submitted_at`/`pipeline_entry_at`. Called once by the
    /// controller at `handle()` time; idempotent if called again.
    pub fn stamp_submission(mut self, submitted_at: DateTime<Utc>, pipeline_entry_at: DateTime<Utc>) -> Self {
        self.submitted_at = Some(submitted_at);
        self.pipeline_entry_at = Some(pipeline_entry_at);
        self
    }

    /// Re-wrap the payload, keeping every other field (used when converting
    /// a typed envelope to its serialized record form and back).
    pub fn map_payload<F, E2>(self, f: F) -> EventEnvelope<K, E2>
    where
        F: FnOnce(E) -> E2,
    {
        EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type,
            schema_version: self.schema_version,
            source_service: self.source_service,
            occurred_at: self.occurred_at,
            entity_key: self.entity_key,
            correlation_id: self.correlation_id,
            saga: self.saga,
            submitted_at: self.submitted_at,
            pipeline_entry_at: self.pipeline_entry_at,
            payload: f(self.payload),
        }
    }
}
