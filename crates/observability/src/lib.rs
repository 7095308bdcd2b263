//! Tracing, logging, and Prometheus metrics shared by every gridflow crate
//!. Depends only on `gridflow-core`, so any other crate in the
//! workspace may depend on this one without creating a cycle.

mod metrics;
pub mod tracing;

pub use metrics::{MetricsError, MetricsRegistry};

/// Initialize process-wide tracing/logging. Safe to call multiple times;
/// subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}
