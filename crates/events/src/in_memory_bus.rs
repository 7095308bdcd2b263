//! In-process event bus for the PUBLISH pipeline stage and for
//! tests/dev.

use std::sync::{Mutex, mpsc};

use crate::bus::{EventBus, Subscription};

#[derive(Debug)]
pub enum InMemoryBusError {
    Poisoned,
}

/// In-memory pub/sub bus.
///
/// No IO, no async. Best-effort fan-out; at-least-once acceptable
/// (subscribers must be idempotent).
#[derive(Debug)]
pub struct InMemoryEventBus<M> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> InMemoryEventBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for InMemoryEventBus<M> {
    fn default() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }
}

impl<M> EventBus<M> for InMemoryEventBus<M>
where
    M: Clone + Send + 'static,
{
    type Error = InMemoryBusError;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        let mut subs = self.subscribers.lock().map_err(|_| InMemoryBusError::Poisoned)?;
        subs.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_fans_out_to_every_subscriber() {
        let bus: InMemoryEventBus<i32> = InMemoryEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(7).unwrap();
        assert_eq!(a.recv().unwrap(), 7);
        assert_eq!(b.recv().unwrap(), 7);
    }
}
