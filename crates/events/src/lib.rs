//! Event envelopes, the domain `Event`/`Command` traits, an in-process
//! event bus, and projection plumbing — the vocabulary every other gridflow
//! crate builds on.

mod bus;
mod command;
mod envelope;
mod event;
mod handler;
mod in_memory_bus;
mod projection;
mod runner;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::{EventEnvelope, SagaMetadata};
pub use event::Event;
pub use handler::CommandHandler;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use runner::ProjectionRunner;
