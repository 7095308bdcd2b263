//! Scenario 3: an orchestrated saga whose payment step outlives its
//! `step_timeout` ends `TIMED_OUT` rather than `COMPENSATED`, and every
//! already-completed step is undone in reverse order exactly as it would be
//! for an ordinary business failure.
//!
//! This saga is wired independently of [`gridflow_demo::harness::DemoHarness`]
//! (which only exercises the choreographed flavor): `Orchestrator` drives
//! the same `StockLedger`/`PaymentGateway` collaborators from a single local
//! state machine instead of per-service listeners.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use gridflow_core::RuntimeConfig;
use gridflow_demo::inventory::StockLedger;
use gridflow_demo::payment::PaymentGateway;
use gridflow_grid::{Grid, Record};
use gridflow_resilience::ResilienceRegistry;
use gridflow_saga::{DefinitionRegistry, Orchestrator, SagaContext, SagaDefinition, SagaStateStore, SagaStatus, SagaStepResult, StepRecordStatus};

#[tokio::test]
async fn payment_step_timeout_ends_the_saga_timed_out_and_releases_stock() {
    let grid = Grid::new();
    let state_store = Arc::new(SagaStateStore::new(&grid, "saga-state"));
    let definitions = Arc::new(DefinitionRegistry::new());
    let resilience = Arc::new(ResilienceRegistry::new(Arc::new(RuntimeConfig::default())));
    let config = Arc::new(RuntimeConfig::default());
    let orchestrator = Arc::new(Orchestrator::new(state_store.clone(), definitions.clone(), resilience, config));

    let stock = Arc::new(StockLedger::new());
    stock.set_stock("widget", 10);
    let payment = Arc::new(PaymentGateway::new());

    let stock_for_reserve = stock.clone();
    let stock_for_release = stock.clone();
    let payment_for_charge = payment.clone();

    let definition = SagaDefinition::builder("OrderFulfillment")
        .step(
            "ReserveStock",
            "inventory",
            Arc::new(move |ctx: &SagaContext| {
                let stock = stock_for_reserve.clone();
                let sku = ctx.data.get_str("sku").unwrap_or_default().to_string();
                async move {
                    stock.reserve(&sku, 3)?;
                    Ok(SagaStepResult::Completed(Record::new().set("sku", sku)))
                }
            }),
            Some(Arc::new(move |_ctx: &SagaContext| {
                let stock = stock_for_release.clone();
                async move {
                    stock.release("widget", 3);
                    Ok(())
                }
            })),
        )
        .step(
            "ProcessPayment",
            "payment",
            Arc::new(move |ctx: &SagaContext| {
                let payment = payment_for_charge.clone();
                let order_id = ctx.saga_id.clone();
                async move {
                    // Never resolves inside the 100ms step budget below; the
                    // orchestrator's own timeout cancels this future before
                    // `charge` ever runs.
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    payment.charge(&order_id, 1999)?;
                    Ok(SagaStepResult::Completed(Record::new()))
                }
            }),
            None,
        )
        .step_timeout(Duration::from_millis(100))
        .build();
    definitions.register(definition);

    let saga_id = orchestrator.start("OrderFulfillment", Uuid::now_v7(), Record::new().set("sku", "widget")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = state_store.get_saga_state(&saga_id).unwrap();
    assert_eq!(state.status, SagaStatus::TimedOut);

    let payment_step = state.steps.iter().find(|s| s.step_name == "ProcessPayment").unwrap();
    assert_eq!(payment_step.status, StepRecordStatus::Failed);

    assert_eq!(stock.stock("widget"), 10, "the reservation made by the timed-out saga must be released");
    assert!(!payment.was_charged(&saga_id), "payment must never be considered charged once its step times out");
}
