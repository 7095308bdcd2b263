//! The domain event trait.

use chrono::{DateTime, Utc};

/// A fact that happened in the domain: immutable, versioned, append-only.
///
/// Convention for `event_type`: `{module}.{aggregate}.{action}`, e.g.
/// `"inventory.item.stock_reserved"`. Keep it stable — changing it breaks
/// deserialization of historical events.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn event_type(&self) -> &'static str;

    /// Schema version; increment when the event's structure changes and
    /// keep deserializing older versions until the stream no longer needs
    /// them.
    fn version(&self) -> u32;

    /// Business time the event occurred, distinct from when it was
    /// persisted.
    fn occurred_at(&self) -> DateTime<Utc>;
}
