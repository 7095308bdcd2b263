//! Append-only event store, keyed by composite seq-key.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use gridflow_core::{CompositeEventKey, SequenceNumber};
use gridflow_events::EventEnvelope;
use gridflow_grid::{DistributedIdGenerator, Grid, InMemoryKeyedMap, KeyedMap, MapSpace};

use crate::error::StoreError;

/// Append-only, composite-key-addressed event stream, partitioned by entity
/// key so reads and writes for one entity stay on one partition.
pub struct EventStore<K, E> {
    map: Arc<InMemoryKeyedMap<CompositeEventKey<K>, EventEnvelope<K, E>>>,
    id_generator: Arc<dyn DistributedIdGenerator>,
}

impl<K, E> EventStore<K, E>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self {
            map: grid.keyed_map(MapSpace::Local, space_name),
            id_generator: grid.id_generator(),
        }
    }

    /// Append an event to `entity_key`'s stream. Durable before returning;
    /// fails only if the underlying grid call fails — never retried here
    ///.
    pub fn append(&self, entity_key: K, envelope: EventEnvelope<K, E>) -> Result<CompositeEventKey<K>, StoreError> {
        let composite = CompositeEventKey::new(self.id_generator.next(), entity_key);
        self.map.put(composite.clone(), envelope);
        Ok(composite)
    }

    /// Ordered sequence of events for one entity.
    pub fn by_entity(&self, entity_key: &K) -> Vec<EventEnvelope<K, E>>
    where
        K: PartialEq,
    {
        let mut matched: Vec<(SequenceNumber, EventEnvelope<K, E>)> = self
            .map
            .entries()
            .into_iter()
            .filter(|(key, _)| &key.entity_key == entity_key)
            .map(|(key, envelope)| (key.sequence, envelope))
            .collect();
        matched.sort_by_key(|(seq, _)| *seq);
        matched.into_iter().map(|(_, envelope)| envelope).collect()
    }

    /// Events of a given type, most recent `limit`.
    pub fn by_type(&self, event_type: &str, limit: usize) -> Vec<EventEnvelope<K, E>> {
        let mut matched: Vec<(SequenceNumber, EventEnvelope<K, E>)> = self
            .map
            .entries()
            .into_iter()
            .filter(|(_, envelope)| envelope.event_type() == event_type)
            .map(|(key, envelope)| (key.sequence, envelope))
            .collect();
        matched.sort_by_key(|(seq, _)| std::cmp::Reverse(*seq));
        matched.into_iter().take(limit).map(|(_, envelope)| envelope).collect()
    }

    /// Events whose `occurred_at` falls within `[lo, hi]`.
    pub fn by_time_range(&self, lo: DateTime<Utc>, hi: DateTime<Utc>) -> Vec<EventEnvelope<K, E>> {
        let mut matched: Vec<(SequenceNumber, EventEnvelope<K, E>)> = self
            .map
            .entries()
            .into_iter()
            .filter(|(_, envelope)| envelope.occurred_at() >= lo && envelope.occurred_at() <= hi)
            .map(|(key, envelope)| (key.sequence, envelope))
            .collect();
        matched.sort_by_key(|(seq, _)| *seq);
        matched.into_iter().map(|(_, envelope)| envelope).collect()
    }

    /// Number of events recorded for one entity.
    pub fn count(&self, entity_key: &K) -> i64
    where
        K: PartialEq,
    {
        self.map.entries().iter().filter(|(key, _)| &key.entity_key == entity_key).count() as i64
    }
}
