//! Lazily-created, named in-process buses, one per event type.
//!
//! Shaped like `gridflow_durability::TopicRegistry` — a lazy singleton keyed
//! by name — but backing [`gridflow_events::InMemoryEventBus`] instead of a
//! cross-cluster [`gridflow_grid::PubSubTopic`], since the PUBLISH stage
//! only ever talks to the in-process bus; cross-cluster
//! delivery goes through the outbox instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gridflow_events::{EventBus, InMemoryEventBus, Subscription};

pub struct BusRegistry<M> {
    buses: Mutex<HashMap<String, Arc<InMemoryEventBus<M>>>>,
}

impl<M> BusRegistry<M>
where
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self { buses: Mutex::new(HashMap::new()) }
    }

    fn bus_for(&self, event_type: &str) -> Arc<InMemoryEventBus<M>> {
        let mut buses = self.buses.lock().expect("bus registry lock poisoned");
        buses.entry(event_type.to_string()).or_insert_with(|| Arc::new(InMemoryEventBus::new())).clone()
    }

    pub fn publish(&self, event_type: &str, message: M) {
        let _ = self.bus_for(event_type).publish(message);
    }

    pub fn subscribe(&self, event_type: &str) -> Subscription<M> {
        self.bus_for(event_type).subscribe()
    }
}

impl<M> Default for BusRegistry<M>
where
    M: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
