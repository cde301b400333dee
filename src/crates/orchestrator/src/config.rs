//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the workflow coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Ceiling on concurrently executing workflows
    #[serde(default = "default_max_concurrent_workflows")]
    pub max_concurrent_workflows: usize,

    /// Idle wait while paused or while no step is ready, in milliseconds
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Interval between global-timeout scans in milliseconds
    #[serde(default = "default_timeout_monitor_interval_ms")]
    pub timeout_monitor_interval_ms: u64,
}

fn default_max_concurrent_workflows() -> usize {
    10
}

fn default_idle_poll_ms() -> u64 {
    50
}

fn default_timeout_monitor_interval_ms() -> u64 {
    500
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: default_max_concurrent_workflows(),
            idle_poll_ms: default_idle_poll_ms(),
            timeout_monitor_interval_ms: default_timeout_monitor_interval_ms(),
        }
    }
}

impl CoordinatorConfig {
    /// Load a coordinator configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::OrchestratorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            crate::OrchestratorError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Idle poll interval as a [`Duration`]
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Timeout monitor interval as a [`Duration`]
    pub fn timeout_monitor_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_monitor_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_concurrent_workflows, 10);
        assert_eq!(config.idle_poll_ms, 50);
        assert_eq!(config.timeout_monitor_interval_ms, 500);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: CoordinatorConfig =
            serde_yaml::from_str("max_concurrent_workflows: 2").unwrap();
        assert_eq!(config.max_concurrent_workflows, 2);
        assert_eq!(config.idle_poll_ms, 50);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "idle_poll_ms: 10").unwrap();

        let config = CoordinatorConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.idle_poll(), Duration::from_millis(10));
    }
}
