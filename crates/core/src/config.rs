//! Runtime configuration surface.
//!
//! `RuntimeConfig` is immutable after construction — every field is either
//! loaded once from a TOML document at startup (via [`RuntimeConfig::load`])
//! or filled in from the documented defaults below.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration document: {0}")]
    Parse(String),

    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Per-instance resilience overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceInstanceConfig {
    pub failure_rate_threshold: f64,
    pub minimum_calls: u32,
    pub sliding_window_size: u32,
    pub wait_duration_in_open: Duration,
    pub permitted_calls_in_half_open: u32,
    pub max_attempts: u32,
    pub wait_duration: Duration,
    pub multiplier: f64,
}

impl Default for ResilienceInstanceConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_calls: 10,
            sliding_window_size: 20,
            wait_duration_in_open: Duration::from_secs(30),
            permitted_calls_in_half_open: 3,
            max_attempts: 3,
            wait_duration: Duration::from_millis(200),
            multiplier: 2.0,
        }
    }
}

/// The structured configuration document loaded at service startup
///. Every field has the documented default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `pipeline.parallelism` — worker count for the dataflow.
    /// Default: `None`, meaning "use the partition count" at wiring time.
    pub pipeline_parallelism: Option<usize>,

    /// `controller.completion.timeout` — controller future timeout.
    pub controller_completion_timeout: Duration,

    /// `saga.timeout.check-interval` — scanner period.
    pub saga_timeout_check_interval: Duration,

    /// `saga.timeout.default-deadline` — default total saga timeout.
    pub saga_timeout_default_deadline: Duration,

    /// `saga.timeout.by-type.<sagaType>` — per-saga-type overrides.
    pub saga_timeout_by_type: HashMap<String, Duration>,

    /// `outbox.enabled`.
    pub outbox_enabled: bool,
    /// `outbox.poll-interval`.
    pub outbox_poll_interval: Duration,
    /// `outbox.max-batch-size`.
    pub outbox_max_batch_size: usize,
    /// `outbox.max-retries`.
    pub outbox_max_retries: u32,
    /// `outbox.entry-ttl`.
    pub outbox_entry_ttl: Duration,

    /// `dlq.enabled`.
    pub dlq_enabled: bool,
    /// `dlq.entry-ttl`.
    pub dlq_entry_ttl: Duration,
    /// `dlq.max-replay-attempts`.
    pub dlq_max_replay_attempts: u32,

    /// `idempotency.enabled`.
    pub idempotency_enabled: bool,
    /// `idempotency.ttl`.
    pub idempotency_ttl: Duration,

    /// `resilience.enabled`.
    pub resilience_enabled: bool,
    /// `resilience.instances.<name>.*` overrides, keyed by instance name.
    pub resilience_instances: HashMap<String, ResilienceInstanceConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pipeline_parallelism: None,
            controller_completion_timeout: Duration::from_secs(30),
            saga_timeout_check_interval: Duration::from_secs(5),
            saga_timeout_default_deadline: Duration::from_secs(30),
            saga_timeout_by_type: HashMap::new(),
            outbox_enabled: true,
            outbox_poll_interval: Duration::from_secs(1),
            outbox_max_batch_size: 50,
            outbox_max_retries: 5,
            outbox_entry_ttl: Duration::from_secs(24 * 60 * 60),
            dlq_enabled: true,
            dlq_entry_ttl: Duration::from_secs(168 * 60 * 60),
            dlq_max_replay_attempts: 3,
            idempotency_enabled: true,
            idempotency_ttl: Duration::from_secs(60 * 60),
            resilience_enabled: true,
            resilience_instances: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Start from the documented defaults.
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    /// Parse a TOML configuration document, falling back to defaults for any
    /// field the document omits.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        toml::from_str(document).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a TOML configuration document from disk.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// The per-saga-type timeout, falling back to the default deadline.
    pub fn saga_deadline_for(&self, saga_type: &str) -> Duration {
        self.saga_timeout_by_type
            .get(saga_type)
            .copied()
            .unwrap_or(self.saga_timeout_default_deadline)
    }

    /// The effective resilience config for a named instance, falling back to
    /// defaults when no override is configured.
    pub fn resilience_instance(&self, name: &str) -> ResilienceInstanceConfig {
        self.resilience_instances.get(name).cloned().unwrap_or_default()
    }
}

/// Builder mirroring the documented-defaults-then-override idiom used across
/// the rest of the workspace's configuration types.
#[derive(Debug, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfigOverrides,
}

#[derive(Debug, Default)]
struct RuntimeConfigOverrides {
    pipeline_parallelism: Option<usize>,
    controller_completion_timeout: Option<Duration>,
    saga_timeout_check_interval: Option<Duration>,
    saga_timeout_default_deadline: Option<Duration>,
}

impl RuntimeConfigBuilder {
    pub fn pipeline_parallelism(mut self, workers: usize) -> Self {
        self.config.pipeline_parallelism = Some(workers);
        self
    }

    pub fn controller_completion_timeout(mut self, timeout: Duration) -> Self {
        self.config.controller_completion_timeout = Some(timeout);
        self
    }

    pub fn saga_timeout_check_interval(mut self, interval: Duration) -> Self {
        self.config.saga_timeout_check_interval = Some(interval);
        self
    }

    pub fn saga_timeout_default_deadline(mut self, deadline: Duration) -> Self {
        self.config.saga_timeout_default_deadline = Some(deadline);
        self
    }

    pub fn build(self) -> RuntimeConfig {
        let defaults = RuntimeConfig::default();
        RuntimeConfig {
            pipeline_parallelism: self.config.pipeline_parallelism.or(defaults.pipeline_parallelism),
            controller_completion_timeout: self
                .config
                .controller_completion_timeout
                .unwrap_or(defaults.controller_completion_timeout),
            saga_timeout_check_interval: self
                .config
                .saga_timeout_check_interval
                .unwrap_or(defaults.saga_timeout_check_interval),
            saga_timeout_default_deadline: self
                .config
                .saga_timeout_default_deadline
                .unwrap_or(defaults.saga_timeout_default_deadline),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_documented_values() {
        let config = RuntimeConfig::default();
        assert_eq!(config.controller_completion_timeout, Duration::from_secs(30));
        assert_eq!(config.saga_timeout_check_interval, Duration::from_secs(5));
        assert_eq!(config.outbox_max_batch_size, 50);
        assert_eq!(config.outbox_max_retries, 5);
        assert_eq!(config.dlq_max_replay_attempts, 3);
        assert_eq!(config.idempotency_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn builder_overrides_only_named_fields() {
        let config = RuntimeConfig::builder()
            .controller_completion_timeout(Duration::from_secs(5))
            .build();

        assert_eq!(config.controller_completion_timeout, Duration::from_secs(5));
        assert_eq!(config.outbox_max_batch_size, 50);
    }

    #[test]
    fn saga_deadline_for_falls_back_to_default() {
        let mut overrides = HashMap::new();
        overrides.insert("OrderFulfillment".to_string(), Duration::from_secs(60));
        let config = RuntimeConfig {
            saga_timeout_by_type: overrides,
            ..RuntimeConfig::default()
        };

        assert_eq!(config.saga_deadline_for("OrderFulfillment"), Duration::from_secs(60));
        assert_eq!(config.saga_deadline_for("Unknown"), Duration::from_secs(30));
    }

    #[test]
    fn from_toml_parses_partial_document() {
        let doc = r#"
            outbox_max_batch_size = 100
        "#;
        let config = RuntimeConfig::from_toml(doc).expect("valid toml");
        assert_eq!(config.outbox_max_batch_size, 100);
        assert_eq!(config.dlq_max_replay_attempts, 3);
    }
}
