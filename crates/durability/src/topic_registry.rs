//! Lazily-created, named shared topics. `Grid::topic` mints a fresh topic on every call, so
//! anything that needs the *same* topic instance across calls — the outbox
//! publisher publishing and a saga listener subscribing — goes through this
//! registry instead, the same lazy-singleton-by-name shape as the
//! resilience crate's per-name circuit breaker registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gridflow_grid::{Grid, PubSubTopic};

pub struct TopicRegistry<M> {
    grid: Grid,
    topics: Mutex<HashMap<String, Arc<PubSubTopic<M>>>>,
}

impl<M> TopicRegistry<M>
where
    M: Clone,
{
    pub fn new(grid: Grid) -> Self {
        Self { grid, topics: Mutex::new(HashMap::new()) }
    }

    pub fn topic(&self, name: &str) -> Arc<PubSubTopic<M>> {
        let mut topics = self.topics.lock().expect("topic registry lock poisoned");
        topics.entry(name.to_string()).or_insert_with(|| self.grid.topic(name)).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridflow_grid::Record;

    #[test]
    fn returns_the_same_topic_instance_for_a_name() {
        let registry: TopicRegistry<Record> = TopicRegistry::new(Grid::new());
        let a = registry.topic("orders");
        let sub = a.subscribe();

        let b = registry.topic("orders");
        b.publish(Record::new().set("order_id", "order-1"));

        assert!(sub.try_recv().is_ok());
    }
}
