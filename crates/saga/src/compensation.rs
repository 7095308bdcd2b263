//! Compensation registry: a process-wide mapping from the event type that
//! starts a saga step forward to the event type and service responsible for
//! undoing it, populated once at startup and consulted whenever a
//! choreographed saga needs to know what compensating for a given step
//! looks like.

use std::collections::HashMap;
use std::sync::RwLock;

/// What undoing one forward step looks like: which event type carries the
/// compensation and which service is expected to react to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationRegistration {
    pub compensation_event_type: String,
    pub responsible_service: String,
}

/// `forwardEventType -> CompensationRegistration`.
pub struct CompensationRegistry {
    entries: RwLock<HashMap<String, CompensationRegistration>>,
}

impl CompensationRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    pub fn register(&self, forward_event_type: impl Into<String>, registration: CompensationRegistration) {
        self.entries
            .write()
            .expect("compensation registry lock poisoned")
            .insert(forward_event_type.into(), registration);
    }

    pub fn get(&self, forward_event_type: &str) -> Option<CompensationRegistration> {
        self.entries.read().expect("compensation registry lock poisoned").get(forward_event_type).cloned()
    }
}

impl Default for CompensationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_forward_type_resolves_its_compensation() {
        let registry = CompensationRegistry::new();
        registry.register(
            "StockReserved",
            CompensationRegistration {
                compensation_event_type: "StockReservationFailed".to_string(),
                responsible_service: "inventory".to_string(),
            },
        );

        let found = registry.get("StockReserved").unwrap();
        assert_eq!(found.responsible_service, "inventory");
        assert!(registry.get("PaymentProcessed").is_none());
    }
}
