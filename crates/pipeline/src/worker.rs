//! Worker pool: consumes the pending journal and runs each entity's events
//! through the pipeline stages in append order, with different entities
//! processed in parallel.
//!
//! A dispatcher thread reads the pending journal and fans each envelope out
//! to one of `worker_count` worker threads by a hash of its entity key, so
//! all events for one entity always land on the same worker and run in
//! append order, while different entities process concurrently.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use gridflow_core::EventId;
use gridflow_events::EventEnvelope;

use crate::pipeline::Pipeline;

const DISPATCH_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Handle to a running pipeline worker pool.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    threads: Vec<thread::JoinHandle<()>>,
}

impl PipelineHandle {
    /// Signal every worker and the dispatcher to stop after their current
    /// item, then join them.
    pub fn shutdown(mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_index<K: Hash>(entity_key: &K, worker_count: usize) -> usize {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    entity_key.hash(&mut hasher);
    (hasher.finish() as usize) % worker_count.max(1)
}

/// Spawn a dispatcher thread plus `worker_count` worker threads over
/// `pipeline`'s pending journal.
///
/// `worker_count` defaults to `pipeline.config().pipeline_parallelism`,
/// falling back to the available parallelism when unset.
pub fn spawn<K, E, V>(pipeline: Arc<Pipeline<K, E, V>>, worker_count: Option<usize>) -> PipelineHandle
where
    K: Clone + Eq + Hash + Send + Sync + PartialEq + 'static,
    E: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let worker_count = worker_count
        .or(pipeline.config().pipeline_parallelism)
        .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(4));

    let running = Arc::new(AtomicBool::new(true));
    let mut threads = Vec::with_capacity(worker_count + 1);
    let mut senders = Vec::with_capacity(worker_count);

    for i in 0..worker_count {
        let (tx, rx) = mpsc::channel::<(EventId, EventEnvelope<K, E>)>();
        senders.push(tx);
        let pipeline = pipeline.clone();
        let running = running.clone();
        threads.push(
            thread::Builder::new()
                .name(format!("gridflow-pipeline-worker-{i}"))
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        match rx.recv_timeout(DISPATCH_POLL_TIMEOUT) {
                            Ok((event_id, envelope)) => {
                                pipeline.process_one(event_id, envelope);
                            }
                            Err(mpsc::RecvTimeoutError::Timeout) => continue,
                            Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .expect("failed to spawn pipeline worker thread"),
        );
    }

    {
        let mut subscription = pipeline.pending_journal().subscribe();
        let running = running.clone();
        threads.push(
            thread::Builder::new()
                .name("gridflow-pipeline-dispatcher".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        match subscription.recv_timeout(DISPATCH_POLL_TIMEOUT) {
                            Ok(change) => {
                                let Some(envelope) = change.new else { continue };
                                let index = worker_index(envelope.entity_key(), worker_count);
                                let _ = senders[index].send((change.key, envelope));
                            }
                            Err(mpsc::RecvTimeoutError::Timeout) => continue,
                            Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
                .expect("failed to spawn pipeline dispatcher thread"),
        );
    }

    PipelineHandle { running, threads }
}
