//! The order-service's view projection: a fold of `OrderEvent` history into
//! current order status.

use serde::{Deserialize, Serialize};

use gridflow_events::EventEnvelope;

use crate::events::OrderEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub order_id: String,
    pub sku: String,
    pub quantity: u32,
    pub amount_cents: u64,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Registered under the name `"order-view-updater"` in the order service's
/// `ViewUpdaterRegistry`, so it can be shipped to a remote partition by
/// name rather than serializing a closure.
pub fn order_view_updater(prior: Option<OrderView>, envelope: &EventEnvelope<String, OrderEvent>) -> OrderView {
    match envelope.payload() {
        OrderEvent::OrderCreated(created) => OrderView {
            order_id: created.order_id.clone(),
            sku: created.sku.clone(),
            quantity: created.quantity,
            amount_cents: created.amount_cents,
            status: OrderStatus::Pending,
        },
        OrderEvent::OrderConfirmed(_) => {
            let mut view = prior.expect("OrderConfirmed without a prior OrderCreated view");
            view.status = OrderStatus::Confirmed;
            view
        }
        OrderEvent::OrderCancelled(_) => {
            let mut view = prior.expect("OrderCancelled without a prior OrderCreated view");
            view.status = OrderStatus::Cancelled;
            view
        }
        // StockReserved/PaymentProcessed are cross-service facts the order
        // service never appends to its own event store; the updater never
        // sees them.
        OrderEvent::StockReserved(_) | OrderEvent::PaymentProcessed(_) => {
            prior.expect("unexpected event type for an order view not yet created")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::OrderCreated;

    #[test]
    fn order_created_seeds_a_pending_view() {
        let envelope = EventEnvelope::new(
            "OrderCreated",
            1,
            "order-service",
            "order-1".to_string(),
            OrderEvent::OrderCreated(OrderCreated { order_id: "order-1".to_string(), sku: "widget".to_string(), quantity: 2, amount_cents: 500 }),
        );
        let view = order_view_updater(None, &envelope);
        assert_eq!(view.status, OrderStatus::Pending);
        assert_eq!(view.quantity, 2);
    }
}
