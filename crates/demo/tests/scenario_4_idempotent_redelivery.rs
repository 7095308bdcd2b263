//! Scenario 4: the shared topic redelivers the same `event_id` twice — the
//! at-least-once republish a producer retries after never seeing its own
//! ack. The idempotency guard must let only the first delivery reach the
//! step handler, so the payment gateway is charged exactly once and exactly
//! one `PaymentProcessed` event is emitted.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use gridflow_core::RuntimeConfig;
use gridflow_demo::payment::{process_payment_handler, PaymentGateway};
use gridflow_durability::{IdempotencyGuard, TopicRegistry};
use gridflow_grid::{Grid, Record};
use gridflow_resilience::ResilienceRegistry;
use gridflow_saga::{ChoreographedSagaRuntime, ForwardStepConfig, SagaStateStore, StepHandler};

#[tokio::test]
async fn duplicate_delivery_of_the_same_event_charges_payment_only_once() {
    let grid = Grid::new();
    let state_store = Arc::new(SagaStateStore::new(&grid, "saga-state"));
    let idempotency = Arc::new(IdempotencyGuard::new(&grid, "idempotency"));
    let resilience = Arc::new(ResilienceRegistry::new(Arc::new(RuntimeConfig::default())));
    let topics = Arc::new(TopicRegistry::new(Grid::new()));
    let runtime = Arc::new(ChoreographedSagaRuntime::new(state_store.clone(), idempotency, resilience, topics.clone()));

    state_store.start_saga("saga-1", "OrderFulfillment", 1, Uuid::now_v7(), Duration::from_secs(30)).unwrap();

    let gateway = Arc::new(PaymentGateway::new());
    let handler_calls = Arc::new(AtomicU32::new(0));

    let gateway_for_handler = gateway.clone();
    let handler_calls_for_handler = handler_calls.clone();
    let handler: Arc<dyn StepHandler> = Arc::new(move |record: Record| {
        let gateway = gateway_for_handler.clone();
        let calls = handler_calls_for_handler.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            process_payment_handler(&gateway, record)
        }
    });

    let config = ForwardStepConfig {
        step_number: 0,
        step_name: "ProcessPayment".to_string(),
        service_name: "payment".to_string(),
        listen_event_type: "StockReserved".to_string(),
        next_event_type: "PaymentProcessed".to_string(),
        failure_event_type: "PaymentFailed".to_string(),
    };
    let next_sub = topics.topic("PaymentProcessed").subscribe();
    runtime.register_forward_step(config, handler, tokio::runtime::Handle::current());

    let record = Record::new().set("saga_id", "saga-1").set("event_id", "evt-1").set("order_id", "order-1").set("amount_cents", 1999u64);
    let topic = topics.topic("StockReserved");
    topic.publish(record.clone());
    topic.publish(record);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while state_store.get_saga_state("saga-1").map(|s| s.completed_steps).unwrap_or(0) < 1 {
        if tokio::time::Instant::now() >= deadline {
            panic!("saga step never completed within timeout");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(handler_calls.load(Ordering::SeqCst), 1, "the handler must run exactly once despite two deliveries of the same event_id");
    assert_eq!(state_store.get_saga_state("saga-1").unwrap().completed_steps, 1);
    assert!(gateway.was_charged("order-1"));

    let emitted = next_sub.try_recv().unwrap();
    assert_eq!(emitted.get_str("order_id"), Some("order-1"));
    assert!(next_sub.try_recv().is_err(), "only one PaymentProcessed event must be emitted for the duplicate pair");

    runtime.shutdown();
}
