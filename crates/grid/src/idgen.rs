//! Distributed ID generator capability.
//!
//! `gridflow-core::SequenceGenerator` already provides the process-local
//! half of this contract (an `AtomicI64`); this module just names it as a
//! grid capability so the rest of the workspace depends on the capability,
//! not the primitive.

use gridflow_core::{SequenceGenerator, SequenceNumber};

/// A source of monotonic, globally sortable sequence numbers.
///
/// A faithful grid hands this out from a cluster-wide generator; the
/// in-memory reference grid backs it with one [`SequenceGenerator`] per
/// process, which already satisfies every guarantee this trait promises
/// for a single-node deployment.
pub trait DistributedIdGenerator: Send + Sync {
    fn next(&self) -> SequenceNumber;
}

impl DistributedIdGenerator for SequenceGenerator {
    fn next(&self) -> SequenceNumber {
        SequenceGenerator::next(self)
    }
}
