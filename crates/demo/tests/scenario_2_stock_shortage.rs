//! Scenario 2: `ReserveStock` rejects the order as a `NonRetryable`
//! business failure; the order is cancelled and the saga finalizes
//! `COMPENSATED` without ever touching payment, and the rejection never
//! opens the inventory circuit breaker.

use std::time::Duration;

use gridflow_demo::{DemoHarness, OrderStatus};
use gridflow_saga::SagaStatus;

#[tokio::test]
async fn stock_shortage_cancels_the_order_and_compensates_the_saga() {
    let harness = DemoHarness::start();
    harness.stock.set_stock("widget", 2);

    let saga_id = harness.create_order("order-2", "widget", 5, 1999).await;

    harness
        .wait_until(Duration::from_secs(2), || {
            harness.state_store.get_saga_state(&saga_id).map(|s| s.status) == Some(SagaStatus::Compensated)
        })
        .await;

    let view = harness.order_controller.pipeline().view_store().get(&"order-2".to_string()).unwrap();
    assert_eq!(view.status, OrderStatus::Cancelled);

    assert_eq!(harness.stock.stock("widget"), 2, "a rejected reservation must not touch stock");
    assert!(!harness.payment.was_charged("order-2"), "payment must never run after stock is rejected");

    assert_eq!(
        harness.resilience_breaker_state("inventory"),
        gridflow_resilience::CircuitState::Closed,
        "a NonRetryable business failure must not open the breaker"
    );

    harness.shutdown().await;
}
