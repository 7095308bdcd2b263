//! The controller: the sole entry point for business code.
//! Stamps metadata, stages events into the pipeline, and resolves a
//! per-event future when the completion record appears.

mod controller;
mod error;
mod pending;

pub use controller::{Controller, SagaHandleMetadata};
pub use error::ControllerError;
pub use pending::PendingTable;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use gridflow_core::RuntimeConfig;
    use gridflow_events::EventEnvelope;
    use gridflow_grid::Grid;
    use gridflow_pipeline::Pipeline;

    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Widget {
        count: u32,
    }

    fn updater(prior: Option<Widget>, event: &EventEnvelope<String, Widget>) -> Widget {
        let mut current = prior.unwrap_or(Widget { count: 0 });
        current.count += event.payload().count;
        current
    }

    #[tokio::test]
    async fn handle_resolves_once_the_pipeline_completes_the_event() {
        let grid = Grid::new();
        let config = Arc::new(RuntimeConfig::default());
        let pipeline = Arc::new(Pipeline::<String, Widget, Widget>::new(&grid, "widgets", "widget-updater", config.clone()));
        pipeline.view_updaters().register("widget-updater", Arc::new(updater));

        let controller = Controller::new(pipeline.clone(), config);

        let envelope = EventEnvelope::new("widget.created", 1, "widget-service", "widget-1".to_string(), Widget { count: 3 });

        let handle_future = controller.handle(envelope, None);
        let event_id_lookup = pipeline.pending_journal().subscribe();

        // Drive the pipeline manually since this test doesn't spin up the
        // worker pool.
        tokio::task::yield_now().await;
        let mut subscription = event_id_lookup;
        if let Ok(change) = subscription.recv_timeout(Duration::from_millis(100)) {
            if let Some(envelope) = change.new {
                pipeline.process_one(change.key, envelope);
            }
        }

        let record = handle_future.await.expect("controller should resolve");
        assert!(record.success);
    }

    #[tokio::test]
    async fn handle_times_out_when_nothing_drives_the_pipeline() {
        let grid = Grid::new();
        let mut config = RuntimeConfig::default();
        config.controller_completion_timeout = Duration::from_millis(20);
        let config = Arc::new(config);
        let pipeline = Arc::new(Pipeline::<String, Widget, Widget>::new(&grid, "widgets", "widget-updater", config.clone()));
        pipeline.view_updaters().register("widget-updater", Arc::new(updater));

        let controller = Controller::new(pipeline, config);
        let envelope = EventEnvelope::new("widget.created", 1, "widget-service", "widget-1".to_string(), Widget { count: 3 });

        let result = controller.handle(envelope, None).await;
        assert!(matches!(result, Err(ControllerError::Timeout(_))));
    }
}
