//! Distributed lock capability. The only user-visible lock that crosses a process boundary is
//! the orchestrator's per-sagaId lock guarding timeout-induced compensation
//!.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::GridError;

/// Releases the held lock when dropped.
pub struct LockGuard<'a, K: Eq + std::hash::Hash> {
    lock: &'a DistributedLock<K>,
    key: K,
}

impl<'a, K: Eq + std::hash::Hash + Clone> Drop for LockGuard<'a, K> {
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}

struct State<K> {
    held: HashMap<K, ()>,
}

/// Per-key exclusive lock with a bounded wait.
///
/// The in-memory reference implements this with a `Condvar`, which gives
/// the same "wait up to a timeout, then give up" semantics a cluster-wide
/// lock manager provides.
pub struct DistributedLock<K> {
    state: Mutex<State<K>>,
    condvar: Condvar,
}

impl<K> DistributedLock<K>
where
    K: Eq + std::hash::Hash + Clone,
{
    pub fn new() -> Self {
        Self { state: Mutex::new(State { held: HashMap::new() }), condvar: Condvar::new() }
    }

    /// Block up to `timeout` acquiring the exclusive lock for `key`.
    pub fn acquire(&self, key: K, timeout: Duration) -> Result<LockGuard<'_, K>, GridError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock().expect("distributed lock poisoned");
        loop {
            if !guard.held.contains_key(&key) {
                guard.held.insert(key.clone(), ());
                return Ok(LockGuard { lock: self, key });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(GridError::LockTimeout(format!("key type {}", std::any::type_name::<K>())));
            }
            let (next_guard, timeout_result) =
                self.condvar.wait_timeout(guard, deadline - now).expect("distributed lock poisoned");
            guard = next_guard;
            if timeout_result.timed_out() && guard.held.contains_key(&key) {
                return Err(GridError::LockTimeout("lock wait timed out".to_string()));
            }
        }
    }

    fn release(&self, key: &K) {
        let mut guard = self.state.lock().expect("distributed lock poisoned");
        guard.held.remove(key);
        self.condvar.notify_all();
    }
}

impl<K> Default for DistributedLock<K>
where
    K: Eq + std::hash::Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedDistributedLock<K> = Arc<DistributedLock<K>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_waits_until_first_releases() {
        let lock: Arc<DistributedLock<String>> = Arc::new(DistributedLock::new());
        let guard = lock.acquire("saga-1".to_string(), Duration::from_millis(50)).unwrap();
        drop(guard);
        let second = lock.acquire("saga-1".to_string(), Duration::from_millis(50));
        assert!(second.is_ok());
    }

    #[test]
    fn acquire_times_out_while_held() {
        let lock: Arc<DistributedLock<String>> = Arc::new(DistributedLock::new());
        let _guard = lock.acquire("saga-1".to_string(), Duration::from_millis(50)).unwrap();
        let second = lock.acquire("saga-1".to_string(), Duration::from_millis(20));
        assert!(matches!(second, Err(GridError::LockTimeout(_))));
    }
}
