//! Command abstraction: intent to do something, as distinct from an event
//! (fact that something happened).

/// A command targets a specific entity by key `K`.
pub trait Command<K>: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_entity_key(&self) -> K;
}
