//! Wires the OrderFulfillment choreographed saga end to end: three "services" sharing one process, each with its own
//! local pipeline/controller, talking to each other purely through the
//! shared topics, saga state store, idempotency guard, and DLQ a real
//! deployment would put on the cluster.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use gridflow_controller::{Controller, SagaHandleMetadata};
use gridflow_core::RuntimeConfig;
use gridflow_durability::{DeadLetterQueue, IdempotencyGuard, Outbox, OutboxPublisher, OutboxPublisherHandle, TopicRegistry};
use gridflow_events::EventEnvelope;
use gridflow_grid::{Grid, Record};
use gridflow_pipeline::{self as pipeline, Pipeline, PipelineHandle};
use gridflow_resilience::ResilienceRegistry;
use gridflow_saga::{ChoreographedSagaRuntime, CompensationConfig, ForwardStepConfig, SagaError, SagaStateStore};

use crate::events::{OrderCancelled, OrderConfirmed, OrderCreated, OrderEvent};
use crate::inventory::{self, StockLedger};
use crate::payment::{self, PaymentGateway};
use crate::view::{order_view_updater, OrderView};

const SAGA_TYPE: &str = "OrderFulfillment";
const STEP_COUNT: u32 = 4;

pub struct DemoHarness {
    pub config: Arc<RuntimeConfig>,
    pub order_controller: Arc<Controller<String, OrderEvent, OrderView>>,
    pub stock: Arc<StockLedger>,
    pub payment: Arc<PaymentGateway>,
    pub state_store: Arc<SagaStateStore>,
    pub idempotency: Arc<IdempotencyGuard>,
    pub dlq: Arc<DeadLetterQueue>,
    pub topics: Arc<TopicRegistry<Record>>,
    pub resilience: Arc<ResilienceRegistry>,

    order_pipeline_handle: Option<PipelineHandle>,
    order_outbox_handle: Option<OutboxPublisherHandle>,
    saga_runtime: Arc<ChoreographedSagaRuntime>,
}

impl DemoHarness {
    /// Build every collaborator and register every choreographed listener,
    /// with an outbox poll interval fast enough for tests to observe
    /// cross-service delivery without sleeping for a full second.
    pub fn start() -> Self {
        let config = Arc::new(RuntimeConfig {
            outbox_poll_interval: Duration::from_millis(15),
            controller_completion_timeout: Duration::from_secs(5),
            ..RuntimeConfig::default()
        });

        let order_grid = Grid::new();
        let order_pipeline = Pipeline::<String, OrderEvent, OrderView>::new(&order_grid, "orders", "order-view-updater", config.clone());
        order_pipeline.view_updaters().register("order-view-updater", Arc::new(order_view_updater));
        let order_outbox = Arc::new(Outbox::new(&order_grid, "order-outbox"));
        let order_pipeline = Arc::new(order_pipeline.with_outbox(order_outbox));
        let order_controller = Arc::new(Controller::new(order_pipeline.clone(), config.clone()));
        let order_pipeline_handle = pipeline::spawn(order_pipeline.clone(), Some(2));

        // Shared-cluster collaborators: one instance, referenced by every
        // simulated service.
        let shared_grid = Grid::new();
        let state_store = Arc::new(SagaStateStore::new(&shared_grid, "saga-state"));
        let idempotency = Arc::new(IdempotencyGuard::new(&shared_grid, "idempotency"));
        let dlq = Arc::new(DeadLetterQueue::new(&shared_grid, "dlq"));
        let topics = Arc::new(TopicRegistry::new(Grid::new()));
        let resilience = Arc::new(ResilienceRegistry::new(config.clone()));

        let order_outbox_publisher = Arc::new(OutboxPublisher::new("order-service", order_outbox, topics.clone(), dlq.clone(), config.clone()));
        let order_outbox_handle = order_outbox_publisher.spawn();

        let saga_runtime = Arc::new(ChoreographedSagaRuntime::new(state_store.clone(), idempotency.clone(), resilience.clone(), topics.clone()));

        let stock = Arc::new(StockLedger::new());
        let payment = Arc::new(PaymentGateway::new());
        let runtime_handle = tokio::runtime::Handle::current();

        register_reserve_stock(&saga_runtime, stock.clone(), runtime_handle.clone());
        register_process_payment(&saga_runtime, payment.clone(), runtime_handle.clone());
        register_confirm_order(&saga_runtime, order_controller.clone(), runtime_handle.clone());
        register_release_stock_compensation(&saga_runtime, stock.clone(), runtime_handle.clone());
        register_cancel_order_compensation(&saga_runtime, order_controller.clone(), runtime_handle);

        Self {
            config,
            order_controller,
            stock,
            payment,
            state_store,
            idempotency,
            dlq,
            topics,
            resilience,
            order_pipeline_handle: Some(order_pipeline_handle),
            order_outbox_handle: Some(order_outbox_handle),
            saga_runtime,
        }
    }

    /// The named circuit breaker's current state — used to assert a
    /// `NonRetryable` business failure never trips the breaker.
    pub fn resilience_breaker_state(&self, name: &str) -> gridflow_resilience::CircuitState {
        self.resilience.breaker_state(name)
    }

    /// `handle(orderCreated{...})`: stage `CreateOrder`
    /// as step 0 of a new saga, stamped with the saga metadata downstream
    /// choreographed listeners key off of.
    pub async fn create_order(&self, order_id: &str, sku: &str, quantity: u32, amount_cents: u64) -> String {
        let saga_id = Uuid::now_v7().to_string();
        let correlation_id = Uuid::now_v7();
        self.state_store
            .start_saga(saga_id.clone(), SAGA_TYPE, STEP_COUNT, correlation_id, self.config.saga_deadline_for(SAGA_TYPE))
            .expect("starting a fresh saga never conflicts");

        let envelope = EventEnvelope::new(
            "OrderCreated",
            1,
            "order-service",
            order_id.to_string(),
            OrderEvent::OrderCreated(OrderCreated { order_id: order_id.to_string(), sku: sku.to_string(), quantity, amount_cents }),
        )
        .with_correlation_id(correlation_id);

        let saga_meta = SagaHandleMetadata { saga_id: saga_id.clone(), saga_type: SAGA_TYPE.to_string(), step_number: 0, is_compensating: false };
        let completion = self.order_controller.handle(envelope, Some(saga_meta)).await.expect("CreateOrder should complete");
        assert!(completion.success, "CreateOrder stage failed: {:?}", completion.failure_reason);

        self.state_store.record_step_completed(&saga_id, 0, "CreateOrder", "order").expect("saga was just started");
        saga_id
    }

    /// Poll until `f` is true or `timeout` elapses, used to wait for the
    /// asynchronous choreography (outbox drain + listener threads) to
    /// settle without hard-coding a sleep duration.
    pub async fn wait_until(&self, timeout: Duration, mut f: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        while !f() {
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not met within {timeout:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn shutdown(mut self) {
        self.saga_runtime.shutdown();
        if let Some(handle) = self.order_pipeline_handle.take() {
            handle.shutdown();
        }
        if let Some(handle) = self.order_outbox_handle.take() {
            handle.shutdown().await;
        }
    }
}

fn register_reserve_stock(runtime: &Arc<ChoreographedSagaRuntime>, stock: Arc<StockLedger>, handle: tokio::runtime::Handle) {
    let config = ForwardStepConfig {
        step_number: 1,
        step_name: "ReserveStock".to_string(),
        service_name: "inventory".to_string(),
        listen_event_type: "OrderCreated".to_string(),
        next_event_type: "StockReserved".to_string(),
        failure_event_type: "StockReservationFailed".to_string(),
    };
    let handler: Arc<dyn gridflow_saga::StepHandler> = Arc::new(move |record: Record| {
        let stock = stock.clone();
        async move { inventory::reserve_stock_handler(&stock, record) }
    });
    runtime.register_forward_step(config, handler, handle);
}

fn register_process_payment(runtime: &Arc<ChoreographedSagaRuntime>, gateway: Arc<PaymentGateway>, handle: tokio::runtime::Handle) {
    let config = ForwardStepConfig {
        step_number: 2,
        step_name: "ProcessPayment".to_string(),
        service_name: "payment".to_string(),
        listen_event_type: "StockReserved".to_string(),
        next_event_type: "PaymentProcessed".to_string(),
        failure_event_type: "PaymentFailed".to_string(),
    };
    let handler: Arc<dyn gridflow_saga::StepHandler> = Arc::new(move |record: Record| {
        let gateway = gateway.clone();
        async move { payment::process_payment_handler(&gateway, record) }
    });
    runtime.register_forward_step(config, handler, handle);
}

/// `ConfirmOrder` also re-enters the order service's own pipeline so the
/// order's event history and view reflect the confirmation, not just the
/// shared-topic broadcast.
fn register_confirm_order(
    runtime: &Arc<ChoreographedSagaRuntime>,
    controller: Arc<Controller<String, OrderEvent, OrderView>>,
    handle: tokio::runtime::Handle,
) {
    let config = ForwardStepConfig {
        step_number: 3,
        step_name: "ConfirmOrder".to_string(),
        service_name: "order".to_string(),
        listen_event_type: "PaymentProcessed".to_string(),
        next_event_type: "OrderConfirmed".to_string(),
        failure_event_type: "OrderConfirmationFailed".to_string(),
    };
    let handler: Arc<dyn gridflow_saga::StepHandler> = Arc::new(move |record: Record| {
        let controller = controller.clone();
        async move {
            let order_id = record.get_str("order_id").unwrap_or_default().to_string();
            let saga_id = record.get_str("saga_id").unwrap_or_default().to_string();
            let envelope = EventEnvelope::new(
                "OrderConfirmed",
                1,
                "order-service",
                order_id.clone(),
                OrderEvent::OrderConfirmed(OrderConfirmed { order_id: order_id.clone() }),
            );
            let saga_meta = SagaHandleMetadata { saga_id, saga_type: SAGA_TYPE.to_string(), step_number: 3, is_compensating: false };
            controller
                .handle(envelope, Some(saga_meta))
                .await
                .map_err(|err| SagaError::StepFailed(order_id.clone(), err.to_string()))?;
            Ok(record)
        }
    });
    runtime.register_forward_step(config, handler, handle);
}

fn register_release_stock_compensation(runtime: &Arc<ChoreographedSagaRuntime>, stock: Arc<StockLedger>, handle: tokio::runtime::Handle) {
    let config = CompensationConfig {
        step_number: 1,
        step_name: "ReleaseStock".to_string(),
        service_name: "inventory".to_string(),
        failure_event_type: "PaymentFailed".to_string(),
    };
    let handler: Arc<dyn gridflow_saga::CompensationHandler> = Arc::new(move |record: Record| {
        let stock = stock.clone();
        async move { inventory::release_stock_handler(&stock, record) }
    });
    runtime.register_compensation(config, handler, handle);
}

fn register_cancel_order_compensation(
    runtime: &Arc<ChoreographedSagaRuntime>,
    controller: Arc<Controller<String, OrderEvent, OrderView>>,
    handle: tokio::runtime::Handle,
) {
    for failure_event_type in ["StockReservationFailed", "PaymentFailed"] {
        let config = CompensationConfig {
            step_number: 0,
            step_name: "CancelOrder".to_string(),
            service_name: "order".to_string(),
            failure_event_type: failure_event_type.to_string(),
        };
        let controller = controller.clone();
        let handler: Arc<dyn gridflow_saga::CompensationHandler> = Arc::new(move |record: Record| {
            let controller = controller.clone();
            async move {
                let order_id = record.get_str("order_id").unwrap_or_default().to_string();
                let reason = record.get_str("reason").unwrap_or("unknown").to_string();

                // Re-enter the order's own pipeline under a terminal event
                // type nothing compensates on: resubmitting the triggering
                // failure event type itself would republish it to the same
                // shared topic (a fresh event_id each time) and re-fire this
                // very listener indefinitely.
                let payload = OrderEvent::OrderCancelled(OrderCancelled { order_id: order_id.clone(), reason });
                let envelope = EventEnvelope::new("OrderCancelled", 1, "order-service", order_id.clone(), payload);
                controller
                    .handle(envelope, None)
                    .await
                    .map_err(|err| SagaError::CompensationFailed(order_id.clone(), err.to_string()))?;
                Ok(())
            }
        });
        runtime.register_compensation(config, handler, handle.clone());
    }
}
