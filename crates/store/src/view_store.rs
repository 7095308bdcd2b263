//! Read-optimized view store: one mutable `EntityView` per entity key,
//! updated atomically via a partition-local processor.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use gridflow_events::EventEnvelope;
use gridflow_grid::{Grid, InMemoryKeyedMap, KeyedMap, MapSpace};

use crate::error::StoreError;
use crate::event_store::EventStore;

/// A named `(oldView, eventRecord) -> newView` function, registered once at
/// startup and looked up by name at apply time — never shipped as a
/// closure to the owning partition.
pub trait ViewUpdater<K, E, V>: Send + Sync {
    fn apply(&self, current: Option<V>, event: &EventEnvelope<K, E>) -> V;
}

impl<K, E, V, F> ViewUpdater<K, E, V> for F
where
    F: Fn(Option<V>, &EventEnvelope<K, E>) -> V + Send + Sync,
{
    fn apply(&self, current: Option<V>, event: &EventEnvelope<K, E>) -> V {
        self(current, event)
    }
}

/// Registry of named view updaters for one `(K, E, V)` triple.
pub struct ViewUpdaterRegistry<K, E, V> {
    updaters: RwLock<HashMap<String, Arc<dyn ViewUpdater<K, E, V>>>>,
}

impl<K, E, V> ViewUpdaterRegistry<K, E, V> {
    pub fn new() -> Self {
        Self { updaters: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, name: impl Into<String>, updater: Arc<dyn ViewUpdater<K, E, V>>) {
        self.updaters.write().expect("view updater registry lock poisoned").insert(name.into(), updater);
    }

    fn get(&self, name: &str) -> Result<Arc<dyn ViewUpdater<K, E, V>>, StoreError> {
        self.updaters
            .read()
            .expect("view updater registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownUpdater(name.to_string()))
    }
}

impl<K, E, V> Default for ViewUpdaterRegistry<K, E, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-optimized, mutable projection keyed by entity `K`.
pub struct ViewStore<K, V> {
    map: Arc<InMemoryKeyedMap<K, V>>,
}

impl<K, V> ViewStore<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(grid: &Grid, space_name: &str) -> Self {
        Self { map: grid.keyed_map(MapSpace::Local, space_name) }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.map.get(key)
    }

    pub fn put(&self, key: K, value: V) {
        self.map.put(key, value);
    }

    /// Atomically mutate `VIEW[key]`: read current, run the named updater,
    /// write back — all under the map's single read-modify-write lock, so
    /// no distributed lock is needed.
    pub fn apply_event<E>(
        &self,
        key: &K,
        event: &EventEnvelope<K, E>,
        updater_name: &str,
        registry: &ViewUpdaterRegistry<K, E, V>,
    ) -> Result<V, StoreError>
    where
        K: Clone,
        E: Clone,
    {
        let updater = registry.get(updater_name)?;
        let event = event.clone();
        let result = self.map.process(key, Box::new(move |current| Some(updater.apply(current, &event))));
        Ok(result.expect("updater always returns Some"))
    }

    /// Replay `EVENT_STORE.byEntity(key)` through the registered updater to
    /// produce a fresh view.
    pub fn rebuild<E>(
        &self,
        key: &K,
        events: &EventStore<K, E>,
        updater_name: &str,
        registry: &ViewUpdaterRegistry<K, E, V>,
    ) -> Result<V, StoreError>
    where
        K: PartialEq,
        E: Clone + Send + Sync + 'static,
    {
        let updater = registry.get(updater_name)?;
        let mut current: Option<V> = None;
        for envelope in events.by_entity(key) {
            current = Some(updater.apply(current, &envelope));
        }
        let view = current.expect("rebuild requires at least one event for the entity");
        self.map.put(key.clone(), view.clone());
        Ok(view)
    }

    /// Rebuild every view known to this store's backing entity set.
    /// Partitioned trivially here since the in-memory
    /// reference keeps one partition; a clustered grid would fan this out
    /// per partition and resume from a checkpoint.
    pub fn rebuild_all<E>(
        &self,
        entity_keys: impl IntoIterator<Item = K>,
        events: &EventStore<K, E>,
        updater_name: &str,
        registry: &ViewUpdaterRegistry<K, E, V>,
    ) -> Result<usize, StoreError>
    where
        K: PartialEq,
        E: Clone + Send + Sync + 'static,
    {
        let mut rebuilt = 0;
        for key in entity_keys {
            self.rebuild(&key, events, updater_name, registry)?;
            rebuilt += 1;
        }
        Ok(rebuilt)
    }
}
