//! Counters, gauges, and histograms for every metric the framework emits.
//!
//! Structured the way `adaptive_pipeline`'s `MetricsService` is: one typed
//! field per metric family, a constructor that registers all of them against
//! a single `prometheus::Registry` and maps registration failures to
//! [`MetricsError`], and `record_*`/`set_*`/`observe_*` methods called from
//! the instrumented call sites in the pipeline, controller, resilience,
//! durability, and saga crates.

use prometheus::{Counter, CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use thiserror::Error;

use gridflow_core::FrameworkError;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(String),
}

/// The full set of metrics this framework exposes, namespaced `gridflow_*`.
pub struct MetricsRegistry {
    registry: Registry,

    pipeline_events_total: CounterVec,
    pipeline_stage_duration_seconds: HistogramVec,
    pipeline_endtoend_duration_seconds: HistogramVec,
    pipeline_pending_events: Gauge,
    pipeline_pending_completions: Gauge,
    pipeline_completions_orphaned: Counter,

    outbox_entries_total: CounterVec,
    dlq_entries_total: CounterVec,
    idempotency_checks_total: CounterVec,

    resilience_calls_total: CounterVec,

    saga_outcomes_total: CounterVec,
    saga_active_count: Gauge,
    saga_compensating_count: Gauge,
    saga_duration_seconds: HistogramVec,
    saga_step_duration_seconds: HistogramVec,
}

impl MetricsRegistry {
    /// Register every metric family against a fresh registry.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let pipeline_events_total = CounterVec::new(
            Opts::new("pipeline_events_total", "Events observed at each pipeline stage").namespace("gridflow"),
            &["stage", "domain"],
        )?;
        registry.register(Box::new(pipeline_events_total.clone()))?;

        let pipeline_stage_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("pipeline_stage_duration_seconds", "Time spent in one pipeline stage")
                .namespace("gridflow"),
            &["stage"],
        )?;
        registry.register(Box::new(pipeline_stage_duration_seconds.clone()))?;

        let pipeline_endtoend_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "pipeline_endtoend_duration_seconds",
                "Time from controller.handle() to completion",
            )
            .namespace("gridflow"),
            &["domain"],
        )?;
        registry.register(Box::new(pipeline_endtoend_duration_seconds.clone()))?;

        let pipeline_pending_events = Gauge::with_opts(
            Opts::new("pipeline_pending_events", "Events currently staged in the PENDING map").namespace("gridflow"),
        )?;
        registry.register(Box::new(pipeline_pending_events.clone()))?;

        let pipeline_pending_completions = Gauge::with_opts(
            Opts::new("pipeline_pending_completions", "Controller futures awaiting completion").namespace("gridflow"),
        )?;
        registry.register(Box::new(pipeline_pending_completions.clone()))?;

        let pipeline_completions_orphaned = Counter::with_opts(
            Opts::new(
                "pipeline_completions_orphaned_total",
                "Controller futures that timed out before completion arrived",
            )
            .namespace("gridflow"),
        )?;
        registry.register(Box::new(pipeline_completions_orphaned.clone()))?;

        let outbox_entries_total = CounterVec::new(
            Opts::new("outbox_entries_total", "Outbox entries by lifecycle transition").namespace("gridflow"),
            &["status"],
        )?;
        registry.register(Box::new(outbox_entries_total.clone()))?;

        let dlq_entries_total = CounterVec::new(
            Opts::new("dlq_entries_total", "Dead-letter entries by action").namespace("gridflow"),
            &["action"],
        )?;
        registry.register(Box::new(dlq_entries_total.clone()))?;

        let idempotency_checks_total = CounterVec::new(
            Opts::new("idempotency_checks_total", "Idempotency guard checks by result").namespace("gridflow"),
            &["result"],
        )?;
        registry.register(Box::new(idempotency_checks_total.clone()))?;

        let resilience_calls_total = CounterVec::new(
            Opts::new("resilience_calls_total", "Resilience wrapper call outcomes, per named instance")
                .namespace("gridflow"),
            &["name", "outcome"],
        )?;
        registry.register(Box::new(resilience_calls_total.clone()))?;

        let saga_outcomes_total = CounterVec::new(
            Opts::new("saga_outcomes_total", "Terminal saga outcomes by type").namespace("gridflow"),
            &["saga_type", "outcome"],
        )?;
        registry.register(Box::new(saga_outcomes_total.clone()))?;

        let saga_active_count = Gauge::with_opts(
            Opts::new("saga_active_count", "Sagas currently in a non-terminal status").namespace("gridflow"),
        )?;
        registry.register(Box::new(saga_active_count.clone()))?;

        let saga_compensating_count = Gauge::with_opts(
            Opts::new("saga_compensating_count", "Sagas currently running compensation").namespace("gridflow"),
        )?;
        registry.register(Box::new(saga_compensating_count.clone()))?;

        let saga_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("saga_duration_seconds", "Total saga wall-clock duration").namespace("gridflow"),
            &["saga_type"],
        )?;
        registry.register(Box::new(saga_duration_seconds.clone()))?;

        let saga_step_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("saga_step_duration_seconds", "Per-step saga duration").namespace("gridflow"),
            &["saga_type", "step_name"],
        )?;
        registry.register(Box::new(saga_step_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            pipeline_events_total,
            pipeline_stage_duration_seconds,
            pipeline_endtoend_duration_seconds,
            pipeline_pending_events,
            pipeline_pending_completions,
            pipeline_completions_orphaned,
            outbox_entries_total,
            dlq_entries_total,
            idempotency_checks_total,
            resilience_calls_total,
            saga_outcomes_total,
            saga_active_count,
            saga_compensating_count,
            saga_duration_seconds,
            saga_step_duration_seconds,
        })
    }

    // --- Pipeline -------------------------------------

    pub fn record_pipeline_event(&self, stage: &str, domain: &str) {
        self.pipeline_events_total.with_label_values(&[stage, domain]).inc();
    }

    pub fn observe_stage_duration(&self, stage: &str, seconds: f64) {
        self.pipeline_stage_duration_seconds.with_label_values(&[stage]).observe(seconds);
    }

    pub fn observe_endtoend_duration(&self, domain: &str, seconds: f64) {
        self.pipeline_endtoend_duration_seconds.with_label_values(&[domain]).observe(seconds);
    }

    pub fn set_pending_events(&self, count: i64) {
        self.pipeline_pending_events.set(count as f64);
    }

    pub fn set_pending_completions(&self, count: i64) {
        self.pipeline_pending_completions.set(count as f64);
    }

    pub fn record_orphaned_completion(&self) {
        self.pipeline_completions_orphaned.inc();
    }

    // --- Durability ------------------------------------

    pub fn record_outbox_entry(&self, status: &str) {
        self.outbox_entries_total.with_label_values(&[status]).inc();
    }

    pub fn record_dlq_entry(&self, action: &str) {
        self.dlq_entries_total.with_label_values(&[action]).inc();
    }

    pub fn record_idempotency_check(&self, result: &str) {
        self.idempotency_checks_total.with_label_values(&[result]).inc();
    }

    // --- Resilience ------------------------------------

    pub fn record_resilience_call(&self, name: &str, outcome: &str) {
        self.resilience_calls_total.with_label_values(&[name, outcome]).inc();
    }

    /// Classify a [`FrameworkError`] surfaced by the resilience layer and
    /// bump the matching counter, so call sites don't need to hand-roll the
    /// `FrameworkError` → metric-outcome mapping themselves.
    pub fn record_framework_error(&self, name: &str, error: &FrameworkError) {
        let outcome = match error {
            FrameworkError::NonRetryable(_) => "ignored",
            FrameworkError::CircuitOpen(_) => "rejected",
            _ => "failure",
        };
        self.record_resilience_call(name, outcome);
    }

    // --- Saga -------------------------------------

    pub fn record_saga_outcome(&self, saga_type: &str, outcome: &str) {
        self.saga_outcomes_total.with_label_values(&[saga_type, outcome]).inc();
    }

    pub fn set_saga_active_count(&self, count: i64) {
        self.saga_active_count.set(count as f64);
    }

    pub fn set_saga_compensating_count(&self, count: i64) {
        self.saga_compensating_count.set(count as f64);
    }

    pub fn observe_saga_duration(&self, saga_type: &str, seconds: f64) {
        self.saga_duration_seconds.with_label_values(&[saga_type]).observe(seconds);
    }

    pub fn observe_saga_step_duration(&self, saga_type: &str, step_name: &str, seconds: f64) {
        self.saga_step_duration_seconds.with_label_values(&[saga_type, step_name]).observe(seconds);
    }

    /// Render the current snapshot in Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Encode(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_duplicate_metric_names() {
        let metrics = MetricsRegistry::new().expect("all metrics register cleanly");
        metrics.record_pipeline_event("persisted", "orders");
        metrics.set_pending_events(3);
        metrics.record_resilience_call("payment-processing", "retry");

        let text = metrics.encode_text().expect("encodes");
        assert!(text.contains("gridflow_pipeline_events_total"));
        assert!(text.contains("gridflow_pipeline_pending_events"));
        assert!(text.contains("gridflow_resilience_calls_total"));
    }

    #[test]
    fn framework_error_classification_maps_to_expected_outcome() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.record_framework_error("payment-processing", &FrameworkError::NonRetryable("insufficient stock".into()));
        metrics.record_framework_error("payment-processing", &FrameworkError::CircuitOpen("open".into()));

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("outcome=\"ignored\""));
        assert!(text.contains("outcome=\"rejected\""));
    }
}
