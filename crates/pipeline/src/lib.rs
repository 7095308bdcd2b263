//! Event-sourcing pipeline: the PERSIST → APPLY → PUBLISH → COMPLETE
//! dataflow each gridflow service embeds, plus the worker pool
//! that drives it off the pending journal.

mod bus_registry;
mod completion;
mod error;
mod pipeline;
mod worker;

pub use bus_registry::BusRegistry;
pub use completion::CompletionRecord;
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use worker::{spawn, PipelineHandle};
