//! Engine configuration types.
//!
//! `EngineConfig` mirrors `config.toml` in the data directory. Every section
//! and field has a default, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration of the flowrun engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Overrides the SQLite URL derived from the data directory.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Wait tracker timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polls of the durable store.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Runs waking within this many seconds of a poll get a timer armed.
    /// Kept larger than the poll interval so no run slips between polls.
    #[serde(default = "default_lookahead_secs")]
    pub lookahead_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_lookahead_secs() -> u64 {
    70
}

impl SchedulerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lookahead(&self) -> Duration {
        Duration::from_secs(self.lookahead_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            lookahead_secs: default_lookahead_secs(),
        }
    }
}

/// Crash reconstruction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Delay before the `executionFinished` notification of a reconstructed run.
    #[serde(default = "default_notify_delay_secs")]
    pub notify_delay_secs: u64,

    /// Node types that start a run and are never reconstructed.
    #[serde(default = "default_trigger_node_types")]
    pub trigger_node_types: Vec<String>,
}

fn default_notify_delay_secs() -> u64 {
    10
}

fn default_trigger_node_types() -> Vec<String> {
    vec!["core.start".to_string(), "core.manualTrigger".to_string()]
}

impl RecoveryConfig {
    pub fn notify_delay(&self) -> Duration {
        Duration::from_secs(self.notify_delay_secs)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            notify_delay_secs: default_notify_delay_secs(),
            trigger_node_types: default_trigger_node_types(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("flowrun/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Where resumed runs are handed back to the graph runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub resume_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.scheduler.lookahead_secs, 70);
        assert_eq!(config.recovery.notify_delay(), Duration::from_secs(10));
        assert_eq!(config.recovery.trigger_node_types.len(), 2);
        assert!(config.runner.resume_url.is_none());
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.lookahead(), Duration::from_secs(70));
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("flowrun/"));
    }

    #[test]
    fn test_engine_config_deserialize_partial_sections() {
        let toml_str = r#"
database_url = "sqlite:///tmp/flowrun.db"

[scheduler]
poll_interval_secs = 5

[recovery]
trigger_node_types = ["custom.webhook"]

[runner]
resume_url = "http://127.0.0.1:5678/resume"
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 5);
        assert_eq!(config.scheduler.lookahead_secs, 70);
        assert_eq!(config.recovery.trigger_node_types, vec!["custom.webhook"]);
        assert_eq!(config.recovery.notify_delay_secs, 10);
        assert_eq!(
            config.runner.resume_url.as_deref(),
            Some("http://127.0.0.1:5678/resume")
        );
    }
}
