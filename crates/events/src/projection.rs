//! Projections build read models from an append-only event stream.

use crate::EventEnvelope;

/// A projection builds a read model from an append-only event stream.
///
/// Projections are pure event consumers; persistence is outside this crate
/// (see `gridflow-store::view_store`).
pub trait Projection {
    type Key;
    type Ev;

    fn apply(&mut self, envelope: &EventEnvelope<Self::Key, Self::Ev>);
}
