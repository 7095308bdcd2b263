//! Identity & metadata primitives.
//!
//! Event IDs are used for correlation and dedupe only; ordering derives
//! entirely from the sequence number, never from the ID's bit pattern.

use core::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Opaque, globally-unique event identifier.
///
/// Generated at envelope construction. Monotonic ordering is *not*
/// guaranteed or required — use [`SequenceNumber`] for ordering.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Mint a new event ID. Uses UUIDv7 so log output sorts roughly by time,
    /// but callers must not rely on that for correctness.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for EventId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EventId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<EventId> for Uuid {
    fn from(value: EventId) -> Self {
        value.0
    }
}

impl FromStr for EventId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("EventId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Monotonic, globally sortable sequence number.
///
/// Strictly increasing within a single process. Stands in for the grid's
/// distributed ID generator capability; the concrete source is
/// [`SequenceGenerator`] below.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceNumber(i64);

impl SequenceNumber {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl core::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Process-local monotonic sequence source.
///
/// A faithful grid would hand this out from a cluster-wide distributed ID
/// generator; the in-memory reference grid backs it with an
/// `AtomicI64`, which already gives the process-local strictly-increasing
/// guarantee callers need.
#[derive(Debug)]
pub struct SequenceGenerator {
    next: AtomicI64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self { next: AtomicI64::new(1) }
    }

    /// Returns a strictly increasing sequence number on every call.
    pub fn next(&self) -> SequenceNumber {
        SequenceNumber(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Partitioned sequence key: `(sequence, entity_key)`.
///
/// `Hash`/`Eq` delegate to `entity_key` alone so that
/// `hash(key) == hash(entity_key)` holds exactly — the locality invariant
/// that keeps every event for one entity on the same partition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompositeEventKey<K> {
    pub sequence: SequenceNumber,
    pub entity_key: K,
}

impl<K> CompositeEventKey<K> {
    pub fn new(sequence: SequenceNumber, entity_key: K) -> Self {
        Self { sequence, entity_key }
    }
}

impl<K: PartialEq> PartialEq for CompositeEventKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence && self.entity_key == other.entity_key
    }
}

impl<K: Eq> Eq for CompositeEventKey<K> {}

impl<K: core::hash::Hash> core::hash::Hash for CompositeEventKey<K> {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.entity_key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_generator_is_strictly_increasing() {
        let gen = SequenceGenerator::new();
        let a = gen.next();
        let b = gen.next();
        let c = gen.next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn composite_key_hash_matches_entity_key_hash() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let key_a = CompositeEventKey::new(SequenceNumber::new(1), "order-1");
        let key_b = CompositeEventKey::new(SequenceNumber::new(2), "order-1");

        let hash_of = |v: &CompositeEventKey<&str>| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };
        let hash_of_entity = |v: &str| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };

        assert_eq!(hash_of(&key_a), hash_of(&key_b));
        assert_eq!(hash_of(&key_a), hash_of_entity("order-1"));
    }
}
