//! Pub/sub topic capability.

use std::sync::{Mutex, mpsc};

/// A subscription handle to a [`PubSubTopic`].
#[derive(Debug)]
pub struct TopicSubscription<M> {
    receiver: mpsc::Receiver<M>,
}

impl<M> TopicSubscription<M> {
    pub fn recv(&self) -> Result<M, mpsc::RecvError> {
        self.receiver.recv()
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<M, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<M, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }
}

/// A named, at-least-once, cluster-wide pub/sub topic.
///
/// Messages are opaque [`crate::record::Record`]s or any `Clone + Send`
/// payload; delivery is best-effort fan-out, so every consumer must be
/// idempotent (the idempotency guard in `gridflow-durability` exists
/// precisely for this).
pub struct PubSubTopic<M> {
    name: String,
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> PubSubTopic<M>
where
    M: Clone,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), subscribers: Mutex::new(Vec::new()) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Publish to every live subscriber. Dead subscribers are dropped from
    /// the fan-out list rather than treated as an error.
    pub fn publish(&self, message: M) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(message.clone()).is_ok());
        }
    }

    pub fn subscribe(&self) -> TopicSubscription<M> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        TopicSubscription { receiver: rx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }
}
