//! The distributed in-memory data grid capability contract and
//! an in-memory reference implementation of it.
//!
//! Every other crate in the workspace depends on these traits, never on a
//! concrete grid vendor — swapping the in-memory reference for a real
//! cluster client means implementing [`map::KeyedMap`], [`journal::ChangeJournal`]
//! and friends against it.

mod error;
mod grid;
mod idgen;
mod journal;
mod listener;
mod lock;
mod map;
mod partition;
mod pubsub;
mod query;
mod record;

pub use error::GridError;
pub use grid::{Grid, MapSpace};
pub use idgen::DistributedIdGenerator;
pub use journal::{ChangeJournal, JournalSubscription};
pub use listener::{EntryChange, ListenerRegistry};
pub use lock::{DistributedLock, LockGuard, SharedDistributedLock};
pub use map::{InMemoryKeyedMap, KeyedMap};
pub use partition::{PartitionProcessor, PartitionProcessorRegistry};
pub use pubsub::{PubSubTopic, TopicSubscription};
pub use query::{Page, query};
pub use record::Record;
