//! Scenario 6: repeated payment-gateway failures trip the named circuit
//! breaker OPEN; calls are rejected without reaching the gateway while
//! OPEN; and the breaker recovers CLOSED through HALF_OPEN once the
//! gateway starts succeeding again.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridflow_core::{ResilienceInstanceConfig, RuntimeConfig};
use gridflow_resilience::{CircuitState, ResilienceError, ResilienceRegistry};
use gridflow_saga::SagaError;

async fn attempt_payment(gateway_down: &AtomicBool, calls: &AtomicU32) -> Result<(), SagaError> {
    calls.fetch_add(1, Ordering::SeqCst);
    if gateway_down.load(Ordering::SeqCst) {
        Err(SagaError::StepFailed("order-1".to_string(), "payment gateway unavailable".to_string()))
    } else {
        Ok(())
    }
}

#[tokio::test]
async fn payment_breaker_opens_then_recovers_through_half_open() {
    let mut config = RuntimeConfig::default();
    config.resilience_instances.insert(
        "payment".to_string(),
        ResilienceInstanceConfig {
            minimum_calls: 4,
            sliding_window_size: 4,
            failure_rate_threshold: 50.0,
            wait_duration_in_open: Duration::from_millis(50),
            permitted_calls_in_half_open: 2,
            max_attempts: 1,
            ..Default::default()
        },
    );
    let registry = ResilienceRegistry::new(Arc::new(config));

    let gateway_down = AtomicBool::new(true);
    let calls = AtomicU32::new(0);

    for _ in 0..4 {
        let _ = registry.execute("payment", || attempt_payment(&gateway_down, &calls)).await;
    }
    assert_eq!(registry.breaker_state("payment"), CircuitState::Open);

    let calls_before_rejection = calls.load(Ordering::SeqCst);
    let rejected = registry.execute("payment", || attempt_payment(&gateway_down, &calls)).await;
    assert!(matches!(rejected, Err(ResilienceError::CircuitOpen(_))));
    assert_eq!(calls.load(Ordering::SeqCst), calls_before_rejection, "a call rejected by an OPEN breaker must never reach the gateway");

    tokio::time::sleep(Duration::from_millis(60)).await;

    gateway_down.store(false, Ordering::SeqCst);
    registry.execute("payment", || attempt_payment(&gateway_down, &calls)).await.unwrap();
    assert_eq!(registry.breaker_state("payment"), CircuitState::HalfOpen);

    registry.execute("payment", || attempt_payment(&gateway_down, &calls)).await.unwrap();
    assert_eq!(registry.breaker_state("payment"), CircuitState::Closed);
}
