//! The embedded grid instance: a single cluster connection with named
//! map-spaces, rather than a split between a separate "local" instance and
//! a "shared" cluster connection.
//!
//! `Grid` is a lightweight factory: every collaborator it hands out
//! (`KeyedMap`, `ChangeJournal`, `PubSubTopic`, `DistributedLock`) is
//! independent and addressed purely by the name passed at construction
//! time. Callers build each collaborator once at wiring time and share the
//! `Arc` rather than routing every access through a god object.

use std::sync::Arc;

use gridflow_core::SequenceGenerator;

use crate::idgen::DistributedIdGenerator;
use crate::journal::ChangeJournal;
use crate::lock::DistributedLock;
use crate::map::InMemoryKeyedMap;
use crate::pubsub::PubSubTopic;

/// Which map-space a collaborator belongs to.
///
/// `Local` collaborators are process-private (e.g. the pending-future
/// table); `Shared` collaborators model state written by multiple services
/// on the cluster (saga state, DLQ, idempotency, outbox, compensation
/// registry) and so always go through CAS (`replace`/`put_if_absent`)
/// rather than read-then-write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapSpace {
    Local,
    Shared,
}

impl MapSpace {
    pub fn qualify(&self, name: &str) -> String {
        match self {
            MapSpace::Local => format!("local::{name}"),
            MapSpace::Shared => format!("shared::{name}"),
        }
    }
}

/// The embedded grid: one process's view of the cluster.
pub struct Grid {
    id_generator: Arc<SequenceGenerator>,
}

impl Grid {
    pub fn new() -> Self {
        Self { id_generator: Arc::new(SequenceGenerator::new()) }
    }

    pub fn id_generator(&self) -> Arc<dyn DistributedIdGenerator> {
        self.id_generator.clone()
    }

    pub fn keyed_map<K, V>(&self, space: MapSpace, name: &str) -> Arc<InMemoryKeyedMap<K, V>>
    where
        K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        Arc::new(InMemoryKeyedMap::new(space.qualify(name)))
    }

    pub fn change_journal<K, V>(&self) -> Arc<ChangeJournal<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        Arc::new(ChangeJournal::new())
    }

    pub fn topic<M>(&self, name: &str) -> Arc<PubSubTopic<M>>
    where
        M: Clone,
    {
        Arc::new(PubSubTopic::new(name))
    }

    pub fn lock_manager<K>(&self) -> Arc<DistributedLock<K>>
    where
        K: Eq + std::hash::Hash + Clone,
    {
        Arc::new(DistributedLock::new())
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}
