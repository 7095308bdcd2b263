//! Command handler abstraction: independent of any particular aggregate
//! lifecycle, useful for workers and tests.

use crate::{Command, Event};

pub trait CommandHandler<K> {
    type Cmd: Command<K>;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}
