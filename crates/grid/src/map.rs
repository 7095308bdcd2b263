//! Keyed map capability.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::GridError;
use crate::listener::{EntryChange, ListenerRegistry};

/// A single stored value plus its optional expiry, as tracked internally by
/// [`InMemoryKeyedMap`].
#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Ordered put/get/replace/remove with per-entry TTL and entry-added
/// listeners, keyed by `K`.
///
/// Every method that mutates the map notifies registered listeners
/// synchronously, mirroring the grid's push-notification contract.
pub trait KeyedMap<K, V>: Send + Sync
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    fn put_with_ttl(&self, key: K, value: V, ttl: Duration);

    /// Atomic compare-and-swap: succeeds only if the current value equals
    /// `expected`. Used throughout the durability and saga layers instead of
    /// read-then-write races.
    fn replace(&self, key: &K, expected: &V, new: V) -> Result<(), GridError>
    where
        V: PartialEq;

    /// Insert only if absent, atomically. Used by the idempotency guard.
    fn put_if_absent(&self, key: K, value: V) -> bool;

    fn remove(&self, key: &K) -> Option<V>;

    fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// All current (non-expired) entries. Backs predicate queries.
    fn entries(&self) -> Vec<(K, V)>;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-modify-write a single entry atomically: `f` sees the current
    /// value (`None` if absent) and returns the new value (`None` to
    /// remove). Backs [`crate::partition::PartitionProcessorRegistry`]'s
    /// "executes atomically on the partition owning the key" contract.
    fn process<'a>(&self, key: &K, f: Box<dyn FnOnce(Option<V>) -> Option<V> + 'a>) -> Option<V>;
}

/// In-memory reference implementation of [`KeyedMap`].
///
/// A faithful grid shards this across partitions by `hash(key)`; the
/// in-memory reference keeps everything in one lock-guarded table, which
/// preserves every ordering and CAS guarantee the trait promises without
/// needing an actual cluster.
pub struct InMemoryKeyedMap<K, V> {
    name: String,
    entries: RwLock<HashMap<K, Slot<V>>>,
    listeners: Arc<ListenerRegistry<K, V>>,
}

impl<K, V> InMemoryKeyedMap<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(HashMap::new()),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry<K, V>> {
        &self.listeners
    }

    fn notify(&self, key: K, old: Option<V>, new: Option<V>) {
        self.listeners.notify(EntryChange { key, old, new });
    }
}

impl<K, V> KeyedMap<K, V> for InMemoryKeyedMap<K, V>
where
    K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().expect("keyed map lock poisoned");
        entries.get(key).filter(|slot| !slot.is_expired()).map(|slot| slot.value.clone())
    }

    fn put(&self, key: K, value: V) {
        let old = {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            entries.insert(
                key.clone(),
                Slot { value: value.clone(), expires_at: None },
            )
        };
        self.notify(key, old.map(|s| s.value), Some(value));
    }

    fn put_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Some(Instant::now() + ttl);
        let old = {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            entries.insert(key.clone(), Slot { value: value.clone(), expires_at })
        };
        self.notify(key, old.map(|s| s.value), Some(value));
    }

    fn replace(&self, key: &K, expected: &V, new: V) -> Result<(), GridError>
    where
        V: PartialEq,
    {
        let old = {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            match entries.get(key) {
                Some(slot) if !slot.is_expired() && &slot.value == expected => {
                    let previous = slot.value.clone();
                    entries.insert(key.clone(), Slot { value: new.clone(), expires_at: None });
                    previous
                }
                _ => {
                    tracing::debug!(map = %self.name, "CAS replace rejected: stale expected value");
                    return Err(GridError::CasMismatch);
                }
            }
        };
        self.notify(key.clone(), Some(old), Some(new));
        Ok(())
    }

    fn put_if_absent(&self, key: K, value: V) -> bool {
        {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            match entries.get(&key) {
                Some(slot) if !slot.is_expired() => return false,
                _ => {
                    entries.insert(key.clone(), Slot { value: value.clone(), expires_at: None });
                }
            }
        }
        self.notify(key, None, Some(value));
        true
    }

    fn remove(&self, key: &K) -> Option<V> {
        let removed = {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            entries.remove(key)
        };
        if let Some(slot) = &removed {
            self.notify(key.clone(), Some(slot.value.clone()), None);
        }
        removed.map(|s| s.value)
    }

    fn entries(&self) -> Vec<(K, V)> {
        let entries = self.entries.read().expect("keyed map lock poisoned");
        entries
            .iter()
            .filter(|(_, slot)| !slot.is_expired())
            .map(|(k, slot)| (k.clone(), slot.value.clone()))
            .collect()
    }

    fn process<'a>(&self, key: &K, f: Box<dyn FnOnce(Option<V>) -> Option<V> + 'a>) -> Option<V> {
        let (old, new) = {
            let mut entries = self.entries.write().expect("keyed map lock poisoned");
            let current = entries.get(key).filter(|slot| !slot.is_expired()).map(|slot| slot.value.clone());
            let updated = f(current.clone());
            match &updated {
                Some(value) => {
                    entries.insert(key.clone(), Slot { value: value.clone(), expires_at: None });
                }
                None => {
                    entries.remove(key);
                }
            }
            (current, updated)
        };
        self.notify(key.clone(), old, new.clone());
        new
    }
}
