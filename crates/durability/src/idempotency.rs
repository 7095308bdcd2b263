//! Idempotency guard: shared-cluster dedupe of at-least-once redeliveries.
//!
//! A single TTL map on the shared cluster, `eventId -> timestamp`, backed
//! by the grid's `put_if_absent` capability.

use std::time::Duration;

use chrono::{DateTime, Utc};

use gridflow_grid::{Grid, InMemoryKeyedMap, KeyedMap, MapSpace};

const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Shared `eventId -> firstSeenAt` map guarding against duplicate
/// at-least-once delivery.
pub struct IdempotencyGuard {
    map: std::sync::Arc<InMemoryKeyedMap<String, DateTime<Utc>>>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self::with_ttl(grid, space_name, DEFAULT_TTL)
    }

    pub fn with_ttl(grid: &Grid, space_name: &str, ttl: Duration) -> Self {
        Self { map: grid.keyed_map(MapSpace::Shared, space_name), ttl }
    }

    /// Atomic `putIfAbsent`; returns `true` iff this call was first to see
    /// `event_id` within the TTL window.
    pub fn try_process(&self, event_id: &str) -> bool {
        let key = event_id.to_string();
        let mut inserted = false;
        self.map.process(
            &key,
            Box::new(|current| match current {
                Some(existing) => Some(existing),
                None => {
                    inserted = true;
                    Some(Utc::now())
                }
            }),
        );
        if inserted {
            // Re-stamp with the configured TTL; `process` above inserts
            // without one so the read-then-decide stays a single atomic op.
            if let Some(seen_at) = self.map.get(&key) {
                self.map.put_with_ttl(key, seen_at, self.ttl);
            }
        }
        inserted
    }

    pub fn has_seen(&self, event_id: &str) -> bool {
        self.map.contains_key(&event_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_process_is_true_only_for_the_first_caller() {
        let grid = Grid::new();
        let guard = IdempotencyGuard::new(&grid, "idempotency");

        assert!(guard.try_process("evt-1"));
        assert!(!guard.try_process("evt-1"));
        assert!(!guard.try_process("evt-1"));
    }

    #[test]
    fn distinct_event_ids_are_independent() {
        let grid = Grid::new();
        let guard = IdempotencyGuard::new(&grid, "idempotency");

        assert!(guard.try_process("evt-1"));
        assert!(guard.try_process("evt-2"));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let grid = Grid::new();
        let guard = IdempotencyGuard::with_ttl(&grid, "idempotency", Duration::from_millis(1));

        assert!(guard.try_process("evt-1"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(guard.try_process("evt-1"));
    }
}
