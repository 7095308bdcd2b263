//! Order-fulfillment domain events. Deliberately
//! thin: enough fields to drive the saga and pipeline plumbing, none of the
//! pricing/inventory/tax logic a real storefront would need.

use serde::{Deserialize, Serialize};

use gridflow_grid::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: String,
    pub sku: String,
    pub quantity: u32,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReserved {
    pub order_id: String,
    pub sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub order_id: String,
    pub amount_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    pub order_id: String,
}

/// Recorded against the order's own event history when a `CancelOrder`
/// compensation runs. Deliberately a distinct event type from the
/// `StockReservationFailed`/`PaymentFailed` broadcasts that triggered the
/// compensation: nothing compensates on it, so republishing it to the
/// shared topic (the outbox does this for every saga-participating event)
/// cannot re-trigger the same compensation listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: String,
    pub reason: String,
}

/// The domain type this demo's pipeline embeds one instance of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    StockReserved(StockReserved),
    PaymentProcessed(PaymentProcessed),
    OrderConfirmed(OrderConfirmed),
    OrderCancelled(OrderCancelled),
}

impl OrderEvent {
    pub fn order_id(&self) -> &str {
        match self {
            OrderEvent::OrderCreated(e) => &e.order_id,
            OrderEvent::StockReserved(e) => &e.order_id,
            OrderEvent::PaymentProcessed(e) => &e.order_id,
            OrderEvent::OrderConfirmed(e) => &e.order_id,
            OrderEvent::OrderCancelled(e) => &e.order_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "OrderCreated",
            OrderEvent::StockReserved(_) => "StockReserved",
            OrderEvent::PaymentProcessed(_) => "PaymentProcessed",
            OrderEvent::OrderConfirmed(_) => "OrderConfirmed",
            OrderEvent::OrderCancelled(_) => "OrderCancelled",
        }
    }
}

/// Convert a typed payload crossing the shared cluster back into a
/// `Record`, the wire shape every choreographed listener and the outbox
/// actually deal in.
pub fn stock_reserved_record(order_id: &str, sku: &str, quantity: u32) -> Record {
    Record::new().set("order_id", order_id).set("sku", sku).set("quantity", quantity)
}

pub fn stock_reservation_failed_record(order_id: &str, sku: &str, reason: &str) -> Record {
    Record::new().set("order_id", order_id).set("sku", sku).set("reason", reason)
}

pub fn payment_processed_record(order_id: &str, amount_cents: u64) -> Record {
    Record::new().set("order_id", order_id).set("amount_cents", amount_cents)
}

pub fn payment_failed_record(order_id: &str, reason: &str) -> Record {
    Record::new().set("order_id", order_id).set("reason", reason)
}

pub fn order_created_record(order_id: &str, sku: &str, quantity: u32, amount_cents: u64) -> Record {
    Record::new().set("order_id", order_id).set("sku", sku).set("quantity", quantity).set("amount_cents", amount_cents)
}
