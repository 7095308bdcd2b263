//! Choreographed sagas: independent per-service listeners, each reacting to
//! one shared-cluster event type and emitting the next event. There is no
//! central coordinator; correctness comes from the compensation registry
//! plus per-step idempotency, not from ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use gridflow_durability::{IdempotencyGuard, TopicRegistry};
use gridflow_grid::Record;
use gridflow_observability::MetricsRegistry;
use gridflow_resilience::{Classify, ResilienceRegistry};

use crate::error::SagaError;
use crate::state_store::{SagaStateStore, SagaStatus, StepRecordStatus};

impl Classify for SagaError {
    /// A transient step-level failure or a CAS conflict is worth retrying;
    /// structural errors (unknown/duplicate saga, mismatched step) and
    /// explicit business-rule violations never resolve by trying again
    ///.
    fn is_non_retryable(&self) -> bool {
        !matches!(self, SagaError::StepFailed(_, _) | SagaError::Conflict(_))
    }
}

/// A forward step's business action: transform the triggering event's
/// record into the payload for the next event in the chain.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn handle(&self, record: Record) -> Result<Record, SagaError>;
}

#[async_trait]
impl<F, Fut> StepHandler for F
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Record, SagaError>> + Send,
{
    async fn handle(&self, record: Record) -> Result<Record, SagaError> {
        (self)(record).await
    }
}

/// A compensating action: undo whatever the forward step already did.
/// Compensations return no payload — only whether the undo itself
/// succeeded — since nothing downstream consumes their output.
#[async_trait]
pub trait CompensationHandler: Send + Sync {
    async fn compensate(&self, record: Record) -> Result<(), SagaError>;
}

#[async_trait]
impl<F, Fut> CompensationHandler for F
where
    F: Fn(Record) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), SagaError>> + Send,
{
    async fn compensate(&self, record: Record) -> Result<(), SagaError> {
        (self)(record).await
    }
}

/// Wiring for one forward step listener.
#[derive(Debug, Clone)]
pub struct ForwardStepConfig {
    pub step_number: u32,
    pub step_name: String,
    pub service_name: String,
    pub listen_event_type: String,
    pub next_event_type: String,
    pub failure_event_type: String,
}

/// Wiring for one compensation listener.
#[derive(Debug, Clone)]
pub struct CompensationConfig {
    pub step_number: u32,
    pub step_name: String,
    pub service_name: String,
    pub failure_event_type: String,
}

/// Hosts every choreographed listener thread for one service. Each
/// registration subscribes to a shared topic and runs its handler on a
/// dedicated thread, bridging the grid's synchronous pub/sub into the
/// async handlers via a borrowed tokio runtime handle.
pub struct ChoreographedSagaRuntime {
    state_store: Arc<SagaStateStore>,
    idempotency: Arc<IdempotencyGuard>,
    resilience: Arc<ResilienceRegistry>,
    topics: Arc<TopicRegistry<Record>>,
    metrics: Option<Arc<MetricsRegistry>>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

const LISTENER_POLL_TIMEOUT: Duration = Duration::from_millis(100);

impl ChoreographedSagaRuntime {
    pub fn new(
        state_store: Arc<SagaStateStore>,
        idempotency: Arc<IdempotencyGuard>,
        resilience: Arc<ResilienceRegistry>,
        topics: Arc<TopicRegistry<Record>>,
    ) -> Self {
        Self {
            state_store,
            idempotency,
            resilience,
            topics,
            metrics: None,
            running: Arc::new(AtomicBool::new(true)),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Stop every listener thread after its current message.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut threads = self.threads.lock().expect("choreographed runtime lock poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }

    /// Subscribe `handler` to `config.listen_event_type`. Guard: records
    /// whose `saga_id` field is empty or absent are skipped (isolation from
    /// orchestrated runs sharing the same event types). Each delivery runs
    /// an idempotency check, then the handler wrapped in the named
    /// resilience instance, then writes the outcome to the saga state store
    /// and emits the next (or failure) event.
    pub fn register_forward_step(
        self: &Arc<Self>,
        config: ForwardStepConfig,
        handler: Arc<dyn StepHandler>,
        runtime_handle: tokio::runtime::Handle,
    ) {
        let topic = self.topics.topic(&config.listen_event_type);
        let subscription = topic.subscribe();
        let this = self.clone();
        let running = self.running.clone();

        let thread = thread::Builder::new()
            .name(format!("gridflow-saga-forward-{}", config.step_name))
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match subscription.recv_timeout(LISTENER_POLL_TIMEOUT) {
                        Ok(record) => runtime_handle.block_on(this.handle_forward(&config, &handler, record)),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn choreographed forward-step thread");

        self.threads.lock().expect("choreographed runtime lock poisoned").push(thread);
    }

    /// Subscribe `handler` to `config.failure_event_type`. Every service
    /// upstream of the failed step registers one of these; they all react
    /// to the same failure broadcast and compensate independently and in
    /// parallel, relying on idempotence rather than ordering.
    pub fn register_compensation(
        self: &Arc<Self>,
        config: CompensationConfig,
        handler: Arc<dyn CompensationHandler>,
        runtime_handle: tokio::runtime::Handle,
    ) {
        let topic = self.topics.topic(&config.failure_event_type);
        let subscription = topic.subscribe();
        let this = self.clone();
        let running = self.running.clone();

        let thread = thread::Builder::new()
            .name(format!("gridflow-saga-compensate-{}", config.step_name))
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    match subscription.recv_timeout(LISTENER_POLL_TIMEOUT) {
                        Ok(record) => runtime_handle.block_on(this.handle_compensation(&config, &handler, record)),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("failed to spawn choreographed compensation thread");

        self.threads.lock().expect("choreographed runtime lock poisoned").push(thread);
    }

    async fn handle_forward(&self, config: &ForwardStepConfig, handler: &Arc<dyn StepHandler>, record: Record) {
        let Some(saga_id) = non_empty_field(&record, "saga_id") else { return };
        let Some(event_id) = non_empty_field(&record, "event_id") else { return };

        let dedupe_key = format!("{event_id}:{}", config.step_name);
        if !self.idempotency.try_process(&dedupe_key) {
            return;
        }

        let outcome = self.resilience.execute(&config.service_name, || handler.handle(record.clone())).await;
        match outcome {
            Ok(next_payload) => {
                if let Err(err) =
                    self.state_store.record_step_completed(&saga_id, config.step_number, &config.step_name, &config.service_name)
                {
                    warn!(saga_id, error = %err, "failed to record saga step completion");
                }
                let next_record = next_payload.set("saga_id", saga_id.clone());
                self.topics.topic(&config.next_event_type).publish(next_record);
                self.record(&config.step_name, "forward-success");
            }
            Err(err) => {
                let reason = err.to_string();
                if let Err(store_err) = self.state_store.record_step_failed(
                    &saga_id,
                    config.step_number,
                    &config.step_name,
                    &config.service_name,
                    &reason,
                ) {
                    warn!(saga_id, error = %store_err, "failed to record saga step failure");
                }
                let failure_record = record.set("saga_id", saga_id.clone()).set("reason", reason);
                self.topics.topic(&config.failure_event_type).publish(failure_record);
                self.record(&config.step_name, "forward-failed");
            }
        }
    }

    async fn handle_compensation(&self, config: &CompensationConfig, handler: &Arc<dyn CompensationHandler>, record: Record) {
        let Some(saga_id) = non_empty_field(&record, "saga_id") else { return };
        let Some(event_id) = non_empty_field(&record, "event_id") else { return };

        let dedupe_key = format!("compensate:{event_id}:{}", config.step_name);
        if !self.idempotency.try_process(&dedupe_key) {
            return;
        }

        let outcome = self.resilience.execute(&config.service_name, || handler.compensate(record.clone())).await;
        let (succeeded, reason) = match outcome {
            Ok(()) => (true, None),
            Err(err) => {
                error!(saga_id, service = %config.service_name, error = %err, "compensation failed");
                (false, Some(err.to_string()))
            }
        };

        if let Err(store_err) = self.state_store.record_compensation_step(
            &saga_id,
            config.step_number,
            &config.step_name,
            &config.service_name,
            succeeded,
            reason.as_deref(),
        ) {
            warn!(saga_id, error = %store_err, "failed to record compensation step");
        }
        self.record(&config.step_name, if succeeded { "compensation-success" } else { "compensation-failed" });
        self.finalize_if_fully_compensated(&saga_id);
    }

    /// There is no central coordinator deciding when a choreographed saga's
    /// compensation is done, so each compensation handler checks for itself:
    /// once every step recorded `Completed` also has a matching
    /// compensation record, the saga is finalized — `FAILED` if any
    /// compensation itself failed, `COMPENSATED` otherwise. Concurrent finalizers racing here is
    /// harmless: `complete_saga` is a no-op once the saga is terminal.
    fn finalize_if_fully_compensated(&self, saga_id: &str) {
        let Some(state) = self.state_store.get_saga_state(saga_id) else { return };
        if state.status.is_terminal() {
            return;
        }
        let needs_compensation: std::collections::HashSet<u32> =
            state.steps.iter().filter(|s| s.status == StepRecordStatus::Completed).map(|s| s.step_number).collect();
        let compensated: std::collections::HashSet<u32> = state
            .steps
            .iter()
            .filter(|s| matches!(s.status, StepRecordStatus::Compensated | StepRecordStatus::CompensationFailed))
            .map(|s| s.step_number)
            .collect();
        if !needs_compensation.is_subset(&compensated) {
            return;
        }
        let any_compensation_failed = state.steps.iter().any(|s| s.status == StepRecordStatus::CompensationFailed);
        let status = if any_compensation_failed { SagaStatus::Failed } else { SagaStatus::Compensated };
        if let Err(err) = self.state_store.complete_saga(saga_id, status) {
            warn!(saga_id, error = %err, "failed to finalize compensated saga");
        }
    }

    fn record(&self, step_name: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_saga_outcome(step_name, outcome);
        }
    }
}

fn non_empty_field(record: &Record, field: &str) -> Option<String> {
    record.get_str(field).filter(|s| !s.is_empty()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_core::RuntimeConfig;
    use gridflow_grid::Grid;
    use uuid::Uuid;

    fn runtime() -> (Arc<ChoreographedSagaRuntime>, Arc<SagaStateStore>, Arc<TopicRegistry<Record>>) {
        let grid = Grid::new();
        let state_store = Arc::new(SagaStateStore::new(&grid, "saga-state"));
        let idempotency = Arc::new(IdempotencyGuard::new(&grid, "idempotency"));
        let resilience = Arc::new(ResilienceRegistry::new(Arc::new(RuntimeConfig::default())));
        let topics = Arc::new(TopicRegistry::new(Grid::new()));
        let runtime = Arc::new(ChoreographedSagaRuntime::new(state_store.clone(), idempotency, resilience, topics.clone()));
        (runtime, state_store, topics)
    }

    #[tokio::test]
    async fn forward_step_skips_records_without_a_saga_id() {
        let (runtime, state_store, _topics) = runtime();
        state_store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

        let config = ForwardStepConfig {
            step_number: 0,
            step_name: "ReserveStock".to_string(),
            service_name: "inventory".to_string(),
            listen_event_type: "OrderCreated".to_string(),
            next_event_type: "StockReserved".to_string(),
            failure_event_type: "StockReservationFailed".to_string(),
        };
        let handler: Arc<dyn StepHandler> = Arc::new(|r: Record| async move { Ok(r) });

        runtime.handle_forward(&config, &handler, Record::new()).await;

        assert!(state_store.get_saga_state("saga-1").unwrap().steps.is_empty());
    }

    #[tokio::test]
    async fn forward_step_records_completion_and_emits_next_event() {
        let (runtime, state_store, topics) = runtime();
        state_store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

        let next_sub = topics.topic("StockReserved").subscribe();

        let config = ForwardStepConfig {
            step_number: 0,
            step_name: "ReserveStock".to_string(),
            service_name: "inventory".to_string(),
            listen_event_type: "OrderCreated".to_string(),
            next_event_type: "StockReserved".to_string(),
            failure_event_type: "StockReservationFailed".to_string(),
        };
        let handler: Arc<dyn StepHandler> = Arc::new(|r: Record| async move { Ok(r.set("sku", "widget")) });

        let record = Record::new().set("saga_id", "saga-1").set("event_id", "evt-1");
        runtime.handle_forward(&config, &handler, record).await;

        let state = state_store.get_saga_state("saga-1").unwrap();
        assert_eq!(state.completed_steps, 1);

        let emitted = next_sub.try_recv().unwrap();
        assert_eq!(emitted.get_str("saga_id"), Some("saga-1"));
        assert_eq!(emitted.get_str("sku"), Some("widget"));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_only_processed_once() {
        let (runtime, state_store, _topics) = runtime();
        state_store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

        let config = ForwardStepConfig {
            step_number: 0,
            step_name: "ReserveStock".to_string(),
            service_name: "inventory".to_string(),
            listen_event_type: "OrderCreated".to_string(),
            next_event_type: "StockReserved".to_string(),
            failure_event_type: "StockReservationFailed".to_string(),
        };
        let handler: Arc<dyn StepHandler> = Arc::new(|r: Record| async move { Ok(r) });
        let record = Record::new().set("saga_id", "saga-1").set("event_id", "evt-1");

        runtime.handle_forward(&config, &handler, record.clone()).await;
        runtime.handle_forward(&config, &handler, record).await;

        assert_eq!(state_store.get_saga_state("saga-1").unwrap().completed_steps, 1);
    }

    #[tokio::test]
    async fn saga_is_compensated_once_every_completed_step_is_undone() {
        let (runtime, state_store, _topics) = runtime();
        state_store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30)).unwrap();
        state_store.record_step_completed("saga-1", 0, "CreateOrder", "order").unwrap();
        state_store.record_step_failed("saga-1", 1, "ReserveStock", "inventory", "insufficient stock").unwrap();

        let config = CompensationConfig {
            step_number: 0,
            step_name: "CancelOrder".to_string(),
            service_name: "order".to_string(),
            failure_event_type: "StockReservationFailed".to_string(),
        };
        let handler: Arc<dyn CompensationHandler> = Arc::new(|_: Record| async move { Ok(()) });
        let record = Record::new().set("saga_id", "saga-1").set("event_id", "evt-1");

        runtime.handle_compensation(&config, &handler, record).await;

        assert_eq!(state_store.get_saga_state("saga-1").unwrap().status, SagaStatus::Compensated);
    }

    #[tokio::test]
    async fn saga_is_failed_when_a_compensation_itself_fails() {
        let (runtime, state_store, _topics) = runtime();
        state_store.start_saga("saga-1", "OrderFulfillment", 2, Uuid::now_v7(), Duration::from_secs(30)).unwrap();
        state_store.record_step_completed("saga-1", 0, "CreateOrder", "order").unwrap();
        state_store.record_step_failed("saga-1", 1, "ReserveStock", "inventory", "insufficient stock").unwrap();

        let config = CompensationConfig {
            step_number: 0,
            step_name: "CancelOrder".to_string(),
            service_name: "order".to_string(),
            failure_event_type: "StockReservationFailed".to_string(),
        };
        let handler: Arc<dyn CompensationHandler> = Arc::new(|_: Record| async move { Err(SagaError::CompensationFailed("saga-1".to_string(), "order service unreachable".to_string())) });
        let record = Record::new().set("saga_id", "saga-1").set("event_id", "evt-1");

        runtime.handle_compensation(&config, &handler, record).await;

        assert_eq!(state_store.get_saga_state("saga-1").unwrap().status, SagaStatus::Failed);
    }
}
