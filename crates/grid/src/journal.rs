//! Change journal capability.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Mutex, RwLock};

use crate::listener::EntryChange;

/// A replay-then-live subscription to a [`ChangeJournal`].
///
/// `recv` first drains whatever was already in the journal at subscribe
/// time, then blocks on newly appended changes — giving late subscribers
/// (e.g. a pipeline worker restarting) the same view as one that was
/// listening from the start.
pub struct JournalSubscription<K, V> {
    backlog: VecDeque<EntryChange<K, V>>,
    live: mpsc::Receiver<EntryChange<K, V>>,
}

impl<K, V> JournalSubscription<K, V> {
    pub fn recv(&mut self) -> Result<EntryChange<K, V>, mpsc::RecvError> {
        if let Some(change) = self.backlog.pop_front() {
            return Ok(change);
        }
        self.live.recv()
    }

    pub fn recv_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<EntryChange<K, V>, mpsc::RecvTimeoutError> {
        if let Some(change) = self.backlog.pop_front() {
            return Ok(change);
        }
        self.live.recv_timeout(timeout)
    }
}

/// Append-only, replayable log of [`EntryChange`]s for one partition's worth
/// of map mutations.
///
/// A faithful grid splits this per-partition so a pipeline worker only
/// replays the slice of the journal its partition owns; the in-memory
/// reference keeps one log per journal instance and expects callers to
/// construct one journal per partition (mirroring how
/// [`crate::map::InMemoryKeyedMap`] expects one instance per named
/// map-space).
pub struct ChangeJournal<K, V> {
    log: RwLock<Vec<EntryChange<K, V>>>,
    subscribers: Mutex<Vec<mpsc::Sender<EntryChange<K, V>>>>,
}

impl<K, V> ChangeJournal<K, V>
where
    K: Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self { log: RwLock::new(Vec::new()), subscribers: Mutex::new(Vec::new()) }
    }

    /// Append a change, persisting it to the log and fanning it out to every
    /// live subscriber.
    pub fn record(&self, change: EntryChange<K, V>) {
        {
            let mut log = self.log.write().expect("journal lock poisoned");
            log.push(change.clone());
        }
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(change.clone()).is_ok());
        }
    }

    pub fn subscribe(&self) -> JournalSubscription<K, V> {
        let backlog: VecDeque<EntryChange<K, V>> =
            self.log.read().expect("journal lock poisoned").iter().cloned().collect();
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        JournalSubscription { backlog, live: rx }
    }

    pub fn len(&self) -> usize {
        self.log.read().expect("journal lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for ChangeJournal<K, V>
where
    K: Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn late_subscriber_replays_backlog_then_gets_live_changes() {
        let journal: ChangeJournal<String, i32> = ChangeJournal::new();
        journal.record(EntryChange { key: "a".into(), old: None, new: Some(1) });

        let mut sub = journal.subscribe();
        journal.record(EntryChange { key: "a".into(), old: Some(1), new: Some(2) });

        let first = sub.recv().unwrap();
        assert_eq!(first.new, Some(1));
        let second = sub.recv().unwrap();
        assert_eq!(second.new, Some(2));
    }
}
