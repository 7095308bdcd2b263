//! Inventory service: the `ReserveStock` forward step and its
//! `ReleaseStock` compensation.

use std::collections::HashMap;
use std::sync::Mutex;

use gridflow_grid::Record;
use gridflow_saga::SagaError;

/// In-memory stock levels, standing in for the persistence adapter a real
/// inventory service would own.
pub struct StockLedger {
    levels: Mutex<HashMap<String, u32>>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self { levels: Mutex::new(HashMap::new()) }
    }

    pub fn set_stock(&self, sku: &str, quantity: u32) {
        self.levels.lock().expect("stock ledger lock poisoned").insert(sku.to_string(), quantity);
    }

    pub fn stock(&self, sku: &str) -> u32 {
        self.levels.lock().expect("stock ledger lock poisoned").get(sku).copied().unwrap_or(0)
    }

    /// The `ReserveStock` business action: decrement `sku`'s stock by
    /// `quantity` if enough is on hand. Insufficient stock is a business
    /// rule violation — never retried, never counted by the circuit
    /// breaker.
    pub fn reserve(&self, sku: &str, quantity: u32) -> Result<(), SagaError> {
        let mut levels = self.levels.lock().expect("stock ledger lock poisoned");
        let available = levels.get(sku).copied().unwrap_or(0);
        if available < quantity {
            return Err(SagaError::NonRetryable(format!("insufficient stock for {sku}: have {available}, need {quantity}")));
        }
        levels.insert(sku.to_string(), available - quantity);
        Ok(())
    }

    /// Compensation: put the reserved quantity back.
    pub fn release(&self, sku: &str, quantity: u32) {
        let mut levels = self.levels.lock().expect("stock ledger lock poisoned");
        *levels.entry(sku.to_string()).or_insert(0) += quantity;
    }
}

impl Default for StockLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward step handler: reserve stock for the order carried in `record`,
/// emitting the fields the next step (`ProcessPayment`) needs.
pub fn reserve_stock_handler(ledger: &StockLedger, record: Record) -> Result<Record, SagaError> {
    let order_id = record.get_str("order_id").unwrap_or_default().to_string();
    let sku = record.get_str("sku").unwrap_or_default().to_string();
    let quantity = record.get("quantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let amount_cents = record.get("amount_cents").and_then(|v| v.as_u64()).unwrap_or(0);

    ledger.reserve(&sku, quantity)?;

    Ok(Record::new().set("order_id", order_id).set("sku", sku).set("quantity", quantity).set("amount_cents", amount_cents))
}

/// Compensation handler: undo a reservation, triggered by any downstream
/// failure event (e.g. `PaymentFailed`) carrying the original order's sku
/// and quantity.
pub fn release_stock_handler(ledger: &StockLedger, record: Record) -> Result<(), SagaError> {
    let sku = record.get_str("sku").unwrap_or_default().to_string();
    let quantity = record.get("quantity").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    ledger.release(&sku, quantity);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_decrements_available_stock() {
        let ledger = StockLedger::new();
        ledger.set_stock("widget", 10);

        let record = Record::new().set("order_id", "order-1").set("sku", "widget").set("quantity", 3u64).set("amount_cents", 999u64);
        let result = reserve_stock_handler(&ledger, record).unwrap();

        assert_eq!(ledger.stock("widget"), 7);
        assert_eq!(result.get_str("sku"), Some("widget"));
    }

    #[test]
    fn reserve_rejects_insufficient_stock_as_non_retryable() {
        let ledger = StockLedger::new();
        ledger.set_stock("widget", 2);

        let record = Record::new().set("order_id", "order-1").set("sku", "widget").set("quantity", 5u64).set("amount_cents", 999u64);
        let err = reserve_stock_handler(&ledger, record).unwrap_err();

        assert!(matches!(err, SagaError::NonRetryable(_)));
        assert_eq!(ledger.stock("widget"), 2);
    }

    #[test]
    fn release_restores_stock() {
        let ledger = StockLedger::new();
        ledger.set_stock("widget", 5);
        let record = Record::new().set("sku", "widget").set("quantity", 5u64);
        reserve_stock_handler(&ledger, record.clone()).unwrap();
        assert_eq!(ledger.stock("widget"), 0);

        release_stock_handler(&ledger, record).unwrap();
        assert_eq!(ledger.stock("widget"), 5);
    }
}
