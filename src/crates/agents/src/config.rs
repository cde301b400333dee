//! Registry configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the agent registry and its background loops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Default per-task timeout in milliseconds
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Interval between health probes in milliseconds
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,

    /// Consecutive probe failures before a worker is restarted
    #[serde(default = "default_health_failure_threshold")]
    pub health_failure_threshold: u32,

    /// Interval between metrics collection passes in milliseconds
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,

    /// Rolling metrics window in seconds; older samples are pruned
    #[serde(default = "default_metrics_window_secs")]
    pub metrics_window_secs: u64,

    /// Default task queue capacity for new workers
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_health_interval_ms() -> u64 {
    5_000
}

fn default_health_failure_threshold() -> u32 {
    3
}

fn default_metrics_interval_ms() -> u64 {
    10_000
}

fn default_metrics_window_secs() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: default_task_timeout_ms(),
            health_interval_ms: default_health_interval_ms(),
            health_failure_threshold: default_health_failure_threshold(),
            metrics_interval_ms: default_metrics_interval_ms(),
            metrics_window_secs: default_metrics_window_secs(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl RegistryConfig {
    /// Load a registry configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::AgentError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| crate::AgentError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Default task timeout as a [`Duration`]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Health probe interval as a [`Duration`]
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    /// Metrics collection interval as a [`Duration`]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    /// Metrics window as a [`Duration`]
    pub fn metrics_window(&self) -> Duration {
        Duration::from_secs(self.metrics_window_secs)
    }
}
