//! Entry-added listener capability.

use std::sync::RwLock;

/// A single map mutation: `old` is `None` on insert, `new` is `None` on
/// removal.
#[derive(Debug, Clone)]
pub struct EntryChange<K, V> {
    pub key: K,
    pub old: Option<V>,
    pub new: Option<V>,
}

type Listener<K, V> = Box<dyn Fn(&EntryChange<K, V>) + Send + Sync>;

/// Registry of in-process listeners for one map.
///
/// Listeners never cross a process boundary — they're always a local
/// `Fn`, never serialized or shipped to another node, unlike the named
/// partition processors in [`crate::partition`].
pub struct ListenerRegistry<K, V> {
    listeners: RwLock<Vec<Listener<K, V>>>,
}

impl<K, V> ListenerRegistry<K, V> {
    pub fn new() -> Self {
        Self { listeners: RwLock::new(Vec::new()) }
    }

    pub fn register<F>(&self, listener: F)
    where
        F: Fn(&EntryChange<K, V>) + Send + Sync + 'static,
    {
        self.listeners.write().expect("listener registry lock poisoned").push(Box::new(listener));
    }

    pub fn notify(&self, change: EntryChange<K, V>) {
        let listeners = self.listeners.read().expect("listener registry lock poisoned");
        for listener in listeners.iter() {
            listener(&change);
        }
    }
}

impl<K, V> Default for ListenerRegistry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
