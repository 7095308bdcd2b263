//! Partition-local processor capability.
//!
//! Per the resolved Design Notes, no closure or code is ever shipped to a
//! partition at call time — callers only ever pass a processor's
//! registered *name*, looked up against a registry populated at startup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::GridError;
use crate::map::KeyedMap;

/// A named, atomic read-modify-write function over one map entry.
pub trait PartitionProcessor<V>: Send + Sync {
    fn apply(&self, current: Option<V>) -> Result<Option<V>, GridError>;
}

impl<V, F> PartitionProcessor<V> for F
where
    F: Fn(Option<V>) -> Result<Option<V>, GridError> + Send + Sync,
{
    fn apply(&self, current: Option<V>) -> Result<Option<V>, GridError> {
        self(current)
    }
}

/// Registry of named partition processors for one value type.
///
/// Callers execute a processor by name against a key on a [`KeyedMap`];
/// the registry is populated once at startup, never per-call, which keeps
/// the "no code shipped across the wire" invariant intact even though
/// everything runs in a single process here.
pub struct PartitionProcessorRegistry<V> {
    processors: RwLock<HashMap<String, Arc<dyn PartitionProcessor<V>>>>,
}

impl<V> PartitionProcessorRegistry<V> {
    pub fn new() -> Self {
        Self { processors: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, name: impl Into<String>, processor: Arc<dyn PartitionProcessor<V>>) {
        self.processors.write().expect("processor registry lock poisoned").insert(name.into(), processor);
    }

    /// Look up `processor_name` and run it atomically against `key` on
    /// `map`, via [`KeyedMap::process`].
    pub fn execute<K>(
        &self,
        map: &dyn KeyedMap<K, V>,
        key: &K,
        processor_name: &str,
    ) -> Result<Option<V>, GridError>
    where
        K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let processor = {
            let processors = self.processors.read().expect("processor registry lock poisoned");
            processors
                .get(processor_name)
                .cloned()
                .ok_or_else(|| GridError::UnknownProcessor(processor_name.to_string()))?
        };

        let mut failure: Option<GridError> = None;
        let result = map.process(
            key,
            Box::new(|current| match processor.apply(current) {
                Ok(updated) => updated,
                Err(err) => {
                    failure = Some(err);
                    None
                }
            }),
        );

        match failure {
            Some(err) => Err(err),
            None => Ok(result),
        }
    }
}

impl<V> Default for PartitionProcessorRegistry<V> {
    fn default() -> Self {
        Self::new()
    }
}
