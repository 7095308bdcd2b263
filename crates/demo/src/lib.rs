//! OrderFulfillment demo: a minimal order/inventory/payment system wired
//! together with the choreographed saga. Not
//! a service a reader would deploy — it exists to exercise the framework
//! crates against a concrete domain.

pub mod events;
pub mod harness;
pub mod inventory;
pub mod payment;
pub mod view;

pub use events::OrderEvent;
pub use harness::DemoHarness;
pub use view::{OrderStatus, OrderView};

// Integration-style scenario tests live under `tests/`, one file per
// scenario, rather than as a `#[cfg(test)] mod` here.
