//! Payment service: the `ProcessPayment` forward step. No compensation of its own — nothing
//! downstream of payment in this demo ever needs to refund it, since
//! `ConfirmOrder` (step 3) cannot fail.

use std::collections::HashSet;
use std::sync::Mutex;

use gridflow_grid::Record;
use gridflow_saga::SagaError;

/// Charges orders, standing in for a real payment gateway.
/// Tracks which orders it has already charged so a handler built on top of
/// it stays idempotent even without the framework's own dedupe guard.
pub struct PaymentGateway {
    charged: Mutex<HashSet<String>>,
}

impl PaymentGateway {
    pub fn new() -> Self {
        Self { charged: Mutex::new(HashSet::new()) }
    }

    pub fn charge(&self, order_id: &str, _amount_cents: u64) -> Result<(), SagaError> {
        self.charged.lock().expect("payment gateway lock poisoned").insert(order_id.to_string());
        Ok(())
    }

    pub fn was_charged(&self, order_id: &str) -> bool {
        self.charged.lock().expect("payment gateway lock poisoned").contains(order_id)
    }
}

impl Default for PaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

pub fn process_payment_handler(gateway: &PaymentGateway, record: Record) -> Result<Record, SagaError> {
    let order_id = record.get_str("order_id").unwrap_or_default().to_string();
    let amount_cents = record.get("amount_cents").and_then(|v| v.as_u64()).unwrap_or(0);

    gateway.charge(&order_id, amount_cents)?;

    Ok(Record::new().set("order_id", order_id).set("amount_cents", amount_cents))
}
