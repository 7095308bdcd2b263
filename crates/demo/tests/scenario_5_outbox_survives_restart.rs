//! Scenario 5: entries written to the outbox survive a publisher restart.
//! The durable outbox map lives on the grid rather than inside the
//! publisher, so an entry written while no publisher is running (a crash
//! between the PERSIST stage and the next scheduled drain) is still there,
//! still `PENDING`, once a fresh publisher instance starts draining it.

use std::sync::Arc;
use std::time::Duration;

use gridflow_core::{EventId, RuntimeConfig};
use gridflow_durability::{DeadLetterQueue, Outbox, OutboxEntry, OutboxPublisher, OutboxStatus, TopicRegistry};
use gridflow_grid::{Grid, Record};

#[tokio::test]
async fn outbox_entries_written_before_a_publisher_exists_are_delivered_after_restart() {
    let grid = Grid::new();
    let outbox = Arc::new(Outbox::new(&grid, "order-outbox"));

    let event_id = EventId::new();
    outbox.write(OutboxEntry::new(event_id, "OrderCreated", Record::new().set("order_id", "order-1"))).unwrap();

    // Nothing drained this yet: standing in for a process that crashed
    // before its outbox publisher ever ticked.
    assert_eq!(outbox.poll_pending(10).len(), 1);

    let topics = Arc::new(TopicRegistry::new(Grid::new()));
    let sub = topics.topic("OrderCreated").subscribe();
    let dlq = Arc::new(DeadLetterQueue::new(&grid, "dlq"));
    let config = Arc::new(RuntimeConfig { outbox_poll_interval: Duration::from_millis(10), ..RuntimeConfig::default() });

    // "Restart": a fresh publisher instance draining the same durable
    // outbox, not the one that (never) wrote the entry.
    let publisher = Arc::new(OutboxPublisher::new("order-service", outbox.clone(), topics.clone(), dlq, config));
    publisher.drain_batch().unwrap();

    assert_eq!(outbox.get(&event_id).unwrap().status, OutboxStatus::Delivered);
    let delivered = sub.try_recv().unwrap();
    assert_eq!(delivered.get_str("order_id"), Some("order-1"));
}
