//! Orchestrated sagas: a single `Orchestrator` drives a `SagaDefinition`'s
//! steps forward in order, off a local state machine rather than
//! independent per-service listeners, and compensates completed steps in
//! strict reverse order the moment one step fails or a deadline scanner
//! calls it in after a timeout.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, warn};
use uuid::Uuid;

use gridflow_core::RuntimeConfig;
use gridflow_grid::{DistributedLock, Record};
use gridflow_observability::MetricsRegistry;
use gridflow_resilience::{ResilienceError, ResilienceRegistry};

use crate::error::SagaError;
use crate::state_store::{SagaStateStore, SagaStatus, StepRecordStatus};

/// The outcome of running one forward step's business action.
#[derive(Debug, Clone, PartialEq)]
pub enum SagaStepResult {
    /// The step succeeded; its record is merged into the running context
    /// and handed to the next step.
    Completed(Record),
    /// The step ran but the business outcome was a failure (e.g.
    /// insufficient stock); triggers compensation the same as an `Err`.
    Failed(String),
    /// The step's own `step_timeout` elapsed before it completed; triggers
    /// compensation the same as `Failed`, but the saga's terminal status is
    /// `TimedOut` rather than `Compensated`/`Failed`.
    TimedOut(String),
}

/// Accumulated saga context threaded through every step: the merged output
/// of every step that has completed so far.
#[derive(Debug, Clone)]
pub struct SagaContext {
    pub saga_id: String,
    pub saga_type: String,
    pub data: Record,
}

impl SagaContext {
    pub fn new(saga_id: impl Into<String>, saga_type: impl Into<String>, data: Record) -> Self {
        Self { saga_id: saga_id.into(), saga_type: saga_type.into(), data }
    }
}

fn merge_records(base: Record, incoming: &Record) -> Record {
    incoming.fields().fold(base, |acc, (field, value)| acc.set(field, value.clone()))
}

/// One step's forward business action.
#[async_trait]
pub trait SagaAction: Send + Sync {
    async fn execute(&self, ctx: &SagaContext) -> Result<SagaStepResult, SagaError>;
}

#[async_trait]
impl<F, Fut> SagaAction for F
where
    F: Fn(&SagaContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SagaStepResult, SagaError>> + Send,
{
    async fn execute(&self, ctx: &SagaContext) -> Result<SagaStepResult, SagaError> {
        (self)(ctx).await
    }
}

/// One step's compensating action, run only for steps that already
/// completed forward.
#[async_trait]
pub trait SagaCompensation: Send + Sync {
    async fn compensate(&self, ctx: &SagaContext) -> Result<(), SagaError>;
}

#[async_trait]
impl<F, Fut> SagaCompensation for F
where
    F: Fn(&SagaContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SagaError>> + Send,
{
    async fn compensate(&self, ctx: &SagaContext) -> Result<(), SagaError> {
        (self)(ctx).await
    }
}

/// One named, ordered step of a [`SagaDefinition`].
pub struct SagaStep {
    pub step_number: u32,
    pub step_name: String,
    pub service_name: String,
    pub action: Arc<dyn SagaAction>,
    pub compensation: Option<Arc<dyn SagaCompensation>>,
    /// Wall-clock budget for one attempt of `action`. `None` means no
    /// per-step deadline beyond the saga's own overall timeout.
    pub step_timeout: Option<Duration>,
    /// Additional attempts after a `SagaStepResult::Failed` business
    /// outcome (not a retry of the resilience-wrapped exception path,
    /// which the named circuit breaker already governs).
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// An ordered list of steps that make up one saga type, built once at
/// startup and looked up by name every time a saga of that type starts.
pub struct SagaDefinition {
    pub saga_type: String,
    pub steps: Vec<SagaStep>,
}

impl SagaDefinition {
    pub fn builder(saga_type: impl Into<String>) -> SagaDefinitionBuilder {
        SagaDefinitionBuilder { saga_type: saga_type.into(), steps: Vec::new() }
    }
}

pub struct SagaDefinitionBuilder {
    saga_type: String,
    steps: Vec<SagaStep>,
}

impl SagaDefinitionBuilder {
    pub fn step(
        mut self,
        step_name: impl Into<String>,
        service_name: impl Into<String>,
        action: Arc<dyn SagaAction>,
        compensation: Option<Arc<dyn SagaCompensation>>,
    ) -> Self {
        let step_number = self.steps.len() as u32;
        self.steps.push(SagaStep {
            step_number,
            step_name: step_name.into(),
            service_name: service_name.into(),
            action,
            compensation,
            step_timeout: None,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        });
        self
    }

    /// Set the wall-clock budget for the step just added via [`Self::step`].
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.step_timeout = Some(timeout);
        }
        self
    }

    /// Set the retry policy for the step just added via [`Self::step`]:
    /// `attempts` additional tries after a `SagaStepResult::Failed`
    /// outcome, waiting `delay` between each.
    pub fn retry(mut self, attempts: u32, delay: Duration) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.max_retries = attempts;
            step.retry_delay = delay;
        }
        self
    }

    pub fn build(self) -> SagaDefinition {
        SagaDefinition { saga_type: self.saga_type, steps: self.steps }
    }
}

/// Process-wide registry of saga definitions, populated once at startup.
pub struct DefinitionRegistry {
    definitions: RwLock<HashMap<String, Arc<SagaDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self { definitions: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, definition: SagaDefinition) {
        self.definitions.write().expect("definition registry lock poisoned").insert(definition.saga_type.clone(), Arc::new(definition));
    }

    pub fn get(&self, saga_type: &str) -> Option<Arc<SagaDefinition>> {
        self.definitions.read().expect("definition registry lock poisoned").get(saga_type).cloned()
    }
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives every orchestrated saga's forward and compensating steps.
pub struct Orchestrator {
    state_store: Arc<SagaStateStore>,
    definitions: Arc<DefinitionRegistry>,
    resilience: Arc<ResilienceRegistry>,
    config: Arc<RuntimeConfig>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Orchestrator {
    pub fn new(
        state_store: Arc<SagaStateStore>,
        definitions: Arc<DefinitionRegistry>,
        resilience: Arc<ResilienceRegistry>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self { state_store, definitions, resilience, config, metrics: None }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn definitions(&self) -> &Arc<DefinitionRegistry> {
        &self.definitions
    }

    /// Register the saga, then run its steps on a background task so the
    /// caller does not block on the full saga duration. Returns the new
    /// saga id as soon as its initial state is durably recorded.
    pub async fn start(self: &Arc<Self>, saga_type: &str, correlation_id: Uuid, initial_data: Record) -> Result<String, SagaError> {
        let definition = self.definitions.get(saga_type).ok_or_else(|| SagaError::NotFound(saga_type.to_string()))?;
        let saga_id = Uuid::now_v7().to_string();
        let deadline = self.config.saga_deadline_for(saga_type);
        self.state_store.start_saga(saga_id.clone(), saga_type.to_string(), definition.steps.len() as u32, correlation_id, deadline)?;

        let this = self.clone();
        let spawned_saga_id = saga_id.clone();
        tokio::spawn(async move { this.run(definition, spawned_saga_id, initial_data).await });

        Ok(saga_id)
    }

    async fn run(self: Arc<Self>, definition: Arc<SagaDefinition>, saga_id: String, initial_data: Record) {
        let mut ctx = SagaContext::new(saga_id.clone(), definition.saga_type.clone(), initial_data);

        for step in &definition.steps {
            let outcome = self.run_step_with_retry(step, &ctx).await;

            match outcome {
                Ok(SagaStepResult::Completed(data)) => {
                    ctx.data = merge_records(ctx.data, &data);
                    if let Err(err) =
                        self.state_store.record_step_completed(&saga_id, step.step_number, &step.step_name, &step.service_name)
                    {
                        warn!(saga_id, error = %err, "failed to record orchestrated step completion");
                    }
                }
                Ok(SagaStepResult::Failed(reason)) => {
                    self.fail_and_compensate(&definition, &saga_id, step, &reason, false).await;
                    return;
                }
                Ok(SagaStepResult::TimedOut(reason)) => {
                    self.fail_and_compensate(&definition, &saga_id, step, &reason, true).await;
                    return;
                }
                Err(err) => {
                    self.fail_and_compensate(&definition, &saga_id, step, &err.to_string(), false).await;
                    return;
                }
            }
        }

        if let Err(err) = self.state_store.complete_saga(&saga_id, SagaStatus::Completed) {
            warn!(saga_id, error = %err, "failed to mark orchestrated saga completed");
        }
        self.record_outcome(&definition.saga_type, "completed");
    }

    /// Run `step.action` once, wrapped in the named circuit breaker/retry
    /// instance and bounded by `step.step_timeout`, then retry the whole
    /// attempt up to `step.max_retries` times (with `step.retry_delay`
    /// between attempts) while the outcome is a business `Failed` result.
    /// A timeout is treated the same as a `Failed` outcome for the retry
    /// loop, matching the "FAILURE / TIMEOUT / exhausted" case in the
    /// step pseudocode.
    async fn run_step_with_retry(&self, step: &SagaStep, ctx: &SagaContext) -> Result<SagaStepResult, ResilienceError<SagaError>> {
        let mut attempt = 0;
        loop {
            let action = step.action.clone();
            let step_ctx = ctx.clone();
            let call = self.resilience.execute(&step.service_name, move || {
                let action = action.clone();
                let step_ctx = step_ctx.clone();
                async move { action.execute(&step_ctx).await }
            });

            let outcome = match step.step_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Ok(SagaStepResult::TimedOut("step timed out".to_string())),
                },
                None => call.await,
            };

            let should_retry =
                matches!(outcome, Ok(SagaStepResult::Failed(_)) | Ok(SagaStepResult::TimedOut(_))) && attempt < step.max_retries;
            if !should_retry {
                return outcome;
            }
            attempt += 1;
            if !step.retry_delay.is_zero() {
                tokio::time::sleep(step.retry_delay).await;
            }
        }
    }

    async fn fail_and_compensate(
        &self,
        definition: &Arc<SagaDefinition>,
        saga_id: &str,
        failed_step: &SagaStep,
        reason: &str,
        is_timeout: bool,
    ) {
        if let Err(err) =
            self.state_store.record_step_failed(saga_id, failed_step.step_number, &failed_step.step_name, &failed_step.service_name, reason)
        {
            warn!(saga_id, error = %err, "failed to record orchestrated step failure");
        }
        self.compensate(definition, saga_id, is_timeout).await;
    }

    /// Undo every step already recorded as completed, strictly in reverse
    /// order, regardless of whether compensation was triggered by a step
    /// failure or by [`Self::trigger_timeout`]. `is_timeout` selects the
    /// terminal status on success (`TimedOut` rather than `Compensated`)
    /// and suppresses the inner outcome metric, since the caller records
    /// its own `timed-out` outcome once for the whole timeout path.
    pub async fn compensate(&self, definition: &Arc<SagaDefinition>, saga_id: &str, is_timeout: bool) {
        let Some(state) = self.state_store.get_saga_state(saga_id) else { return };

        if let Err(err) = self.state_store.record_compensation_started(saga_id) {
            warn!(saga_id, error = %err, "failed to mark orchestrated saga compensating");
        }

        let completed: Vec<_> = state.steps.iter().filter(|record| record.status == StepRecordStatus::Completed).collect();
        let mut all_succeeded = true;

        for record in completed.into_iter().rev() {
            let Some(step) = definition.steps.iter().find(|s| s.step_number == record.step_number) else { continue };
            let Some(compensation) = step.compensation.clone() else { continue };

            let ctx = SagaContext::new(saga_id.to_string(), definition.saga_type.clone(), Record::new());
            let outcome = self.resilience.execute(&step.service_name, move || {
                let compensation = compensation.clone();
                let ctx = ctx.clone();
                async move { compensation.compensate(&ctx).await }
            }).await;

            let (succeeded, failure_reason) = match outcome {
                Ok(()) => (true, None),
                Err(err) => {
                    error!(saga_id, step = %step.step_name, error = %err, "compensation failed");
                    (false, Some(err.to_string()))
                }
            };
            if !succeeded {
                all_succeeded = false;
            }
            if let Err(err) = self.state_store.record_compensation_step(
                saga_id,
                step.step_number,
                &step.step_name,
                &step.service_name,
                succeeded,
                failure_reason.as_deref(),
            ) {
                warn!(saga_id, error = %err, "failed to record orchestrated compensation step");
            }
        }

        let final_status = if !all_succeeded {
            SagaStatus::Failed
        } else if is_timeout {
            SagaStatus::TimedOut
        } else {
            SagaStatus::Compensated
        };
        if let Err(err) = self.state_store.complete_saga(saga_id, final_status) {
            warn!(saga_id, error = %err, "failed to record orchestrated saga's final compensation status");
        }
        if !is_timeout {
            self.record_outcome(&definition.saga_type, if all_succeeded { "compensated" } else { "compensation-failed" });
        }
    }

    /// Called by [`TimeoutScanner`] for a saga whose deadline has passed.
    /// Marks the in-flight step as timed out, then compensates exactly as
    /// it would for any other failure.
    pub async fn trigger_timeout(&self, saga_id: &str) {
        let Some(state) = self.state_store.get_saga_state(saga_id) else { return };
        if state.status.is_terminal() {
            return;
        }
        let Some(definition) = self.definitions.get(&state.saga_type) else { return };

        if let Some(pending_step) = definition.steps.get(state.completed_steps as usize) {
            if let Err(err) = self.state_store.record_step_failed(
                saga_id,
                pending_step.step_number,
                &pending_step.step_name,
                &pending_step.service_name,
                "step timed out",
            ) {
                warn!(saga_id, error = %err, "failed to record orchestrated step timeout");
            }
        }

        self.compensate(&definition, saga_id, true).await;
        self.record_outcome(&state.saga_type, "timed-out");
    }

    fn record_outcome(&self, saga_type: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_saga_outcome(saga_type, outcome);
        }
    }
}

const LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Scheduled scanner: every `saga.timeout.check-interval`, finds sagas past
/// their deadline and hands each to [`Orchestrator::trigger_timeout`],
/// guarded by a per-saga distributed lock so only one running instance
/// actually triggers the timeout for a given saga.
pub struct TimeoutScanner {
    orchestrator: Arc<Orchestrator>,
    state_store: Arc<SagaStateStore>,
    lock_manager: Arc<DistributedLock<String>>,
    config: Arc<RuntimeConfig>,
}

pub struct TimeoutScannerHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl TimeoutScannerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl TimeoutScanner {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        state_store: Arc<SagaStateStore>,
        lock_manager: Arc<DistributedLock<String>>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self { orchestrator, state_store, lock_manager, config }
    }

    pub fn spawn(self: Arc<Self>) -> TimeoutScannerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scanner = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scanner.config.saga_timeout_check_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => scanner.scan_once().await,
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        TimeoutScannerHandle { shutdown: shutdown_tx, task }
    }

    /// One scan pass, also exposed directly for tests and a manual "scan
    /// now" admin operation.
    pub async fn scan_once(&self) {
        let expired = self.state_store.find_by_deadline(Utc::now());
        for state in expired {
            let lock_key = format!("saga-timeout::{}", state.saga_id);
            match self.lock_manager.acquire(lock_key, LOCK_TIMEOUT) {
                Ok(_guard) => self.orchestrator.trigger_timeout(&state.saga_id).await,
                Err(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_grid::Grid;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration as StdDuration;

    fn wiring() -> (Arc<Orchestrator>, Arc<SagaStateStore>, Arc<DefinitionRegistry>) {
        let grid = Grid::new();
        let state_store = Arc::new(SagaStateStore::new(&grid, "saga-state"));
        let definitions = Arc::new(DefinitionRegistry::new());
        let resilience = Arc::new(ResilienceRegistry::new(Arc::new(RuntimeConfig::default())));
        let config = Arc::new(RuntimeConfig::default());
        let orchestrator = Arc::new(Orchestrator::new(state_store.clone(), definitions.clone(), resilience, config));
        (orchestrator, state_store, definitions)
    }

    #[tokio::test]
    async fn happy_path_completes_every_step_in_order() {
        let (orchestrator, state_store, definitions) = wiring();
        let definition = SagaDefinition::builder("OrderFulfillment")
            .step(
                "ReserveStock",
                "inventory",
                Arc::new(|ctx: &SagaContext| {
                    let data = ctx.data.clone().set("stock_reserved", true);
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                None,
            )
            .step(
                "ProcessPayment",
                "payment",
                Arc::new(|ctx: &SagaContext| {
                    let data = ctx.data.clone().set("payment_processed", true);
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                None,
            )
            .build();
        definitions.register(definition);

        let saga_id = orchestrator.start("OrderFulfillment", Uuid::now_v7(), Record::new()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let state = state_store.get_saga_state(&saga_id).unwrap();
        assert_eq!(state.status, SagaStatus::Completed);
        assert_eq!(state.completed_steps, 2);
    }

    #[tokio::test]
    async fn step_failure_compensates_completed_steps_in_reverse_order() {
        let (orchestrator, state_store, definitions) = wiring();
        let compensated_order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let order_for_first = compensated_order.clone();
        let order_for_second = compensated_order.clone();

        let definition = SagaDefinition::builder("OrderFulfillment")
            .step(
                "ReserveStock",
                "inventory",
                Arc::new(|ctx: &SagaContext| {
                    let data = ctx.data.clone();
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                Some(Arc::new(move |_ctx: &SagaContext| {
                    let order = order_for_first.clone();
                    async move {
                        order.lock().unwrap().push("ReserveStock");
                        Ok(())
                    }
                })),
            )
            .step(
                "ProcessPayment",
                "payment",
                Arc::new(|ctx: &SagaContext| {
                    let data = ctx.data.clone();
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                Some(Arc::new(move |_ctx: &SagaContext| {
                    let order = order_for_second.clone();
                    async move {
                        order.lock().unwrap().push("ProcessPayment");
                        Ok(())
                    }
                })),
            )
            .step("ShipOrder", "shipping", Arc::new(|_ctx: &SagaContext| async { Ok(SagaStepResult::Failed("carrier unavailable".to_string())) }), None)
            .build();
        definitions.register(definition);

        let saga_id = orchestrator.start("OrderFulfillment", Uuid::now_v7(), Record::new()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        let state = state_store.get_saga_state(&saga_id).unwrap();
        assert_eq!(state.status, SagaStatus::Compensated);
        assert_eq!(*compensated_order.lock().unwrap(), vec!["ProcessPayment", "ReserveStock"]);
    }

    #[tokio::test]
    async fn trigger_timeout_compensates_in_progress_saga() {
        let (orchestrator, state_store, definitions) = wiring();
        let reserved = Arc::new(AtomicU32::new(0));
        let compensated = Arc::new(AtomicU32::new(0));

        let reserved_for_action = reserved.clone();
        let compensated_for_undo = compensated.clone();

        let definition = SagaDefinition::builder("OrderFulfillment")
            .step(
                "ReserveStock",
                "inventory",
                Arc::new(move |ctx: &SagaContext| {
                    reserved_for_action.fetch_add(1, Ordering::SeqCst);
                    let data = ctx.data.clone();
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                Some(Arc::new(move |_ctx: &SagaContext| {
                    let compensated = compensated_for_undo.clone();
                    async move {
                        compensated.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            )
            .step("AwaitApproval", "approvals", Arc::new(|_ctx: &SagaContext| async { std::future::pending::<()>().await; unreachable!() }), None)
            .build();
        definitions.register(definition);

        let saga_id = orchestrator.start("OrderFulfillment", Uuid::now_v7(), Record::new()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        assert_eq!(reserved.load(Ordering::SeqCst), 1);

        orchestrator.trigger_timeout(&saga_id).await;

        let state = state_store.get_saga_state(&saga_id).unwrap();
        assert_eq!(state.status, SagaStatus::TimedOut);
        assert_eq!(compensated.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn step_timeout_fails_fast_and_compensates_prior_steps() {
        let (orchestrator, state_store, definitions) = wiring();
        let stock_compensated = Arc::new(AtomicU32::new(0));
        let stock_compensated_for_undo = stock_compensated.clone();

        let definition = SagaDefinition::builder("OrderFulfillment")
            .step(
                "ReserveStock",
                "inventory",
                Arc::new(|ctx: &SagaContext| {
                    let data = ctx.data.clone();
                    async move { Ok(SagaStepResult::Completed(data)) }
                }),
                Some(Arc::new(move |_ctx: &SagaContext| {
                    let stock_compensated = stock_compensated_for_undo.clone();
                    async move {
                        stock_compensated.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            )
            .step(
                "ProcessPayment",
                "payment",
                Arc::new(|_ctx: &SagaContext| async {
                    tokio::time::sleep(StdDuration::from_millis(500)).await;
                    Ok(SagaStepResult::Completed(Record::new()))
                }),
                None,
            )
            .step_timeout(StdDuration::from_millis(100))
            .build();
        definitions.register(definition);

        let saga_id = orchestrator.start("OrderFulfillment", Uuid::now_v7(), Record::new()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(300)).await;

        let state = state_store.get_saga_state(&saga_id).unwrap();
        assert_eq!(state.status, SagaStatus::TimedOut);
        assert_eq!(stock_compensated.load(Ordering::SeqCst), 1);
        let payment_step = state.steps.iter().find(|s| s.step_name == "ProcessPayment").unwrap();
        assert_eq!(payment_step.status, StepRecordStatus::Failed);
    }
}
