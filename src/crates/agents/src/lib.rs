//! Agent pool and lifecycle management for colonylib
//!
//! This crate provides the worker side of the orchestration engine: named
//! agent instances with declared capability sets, a registry that manages
//! their lifecycle, and a timeout-bounded, retry-capable task dispatch
//! primitive. Health and metrics monitoring run as independent background
//! loops owned by the registry.

pub mod agent;
pub mod capability;
pub mod config;
pub mod health;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod task;
mod worker;
pub mod workers;

pub use agent::{Agent, AgentConfig, AgentFactory};
pub use capability::CapabilitySet;
pub use config::RegistryConfig;
pub use health::{HealthSnapshot, HealthState};
pub use metrics::{AggregateMetrics, WorkerMetricsSnapshot};
pub use registry::AgentRegistry;
pub use retry::BackoffPolicy;
pub use task::{Task, TaskPriority};

use thiserror::Error;

/// Errors that can occur in the agent layer
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent type name is not registered
    #[error("Unknown agent type: {0}")]
    UnknownType(String),

    /// Agent type name is already registered
    #[error("Agent type already registered: {0}")]
    DuplicateType(String),

    /// Agent instance name is already in use
    #[error("Agent instance already exists: {0}")]
    DuplicateInstance(String),

    /// Agent instance name is not known to the registry
    #[error("Unknown agent instance: {0}")]
    UnknownInstance(String),

    /// Agent instance has not been started
    #[error("Agent '{0}' is not running")]
    NotRunning(String),

    /// Task type is outside the agent's declared capability set
    #[error("Agent '{agent}' does not support task type '{task_type}'")]
    UnsupportedTaskType { agent: String, task_type: String },

    /// The agent's task queue was closed before the task could complete
    #[error("Task queue for agent '{0}' is closed")]
    QueueClosed(String),

    /// Task was not answered within the configured timeout
    #[error("Task {task_id} on agent '{agent}' timed out after {timeout_ms}ms")]
    Timeout {
        agent: String,
        task_id: uuid::Uuid,
        timeout_ms: u64,
    },

    /// The agent reported a task failure
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Worker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Created or started and waiting for work
    Idle,
    /// Currently processing a task
    Running,
    /// Stopped; the task queue is closed
    Stopped,
    /// Unrecoverable error (e.g. a failed restart)
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Running => write!(f, "running"),
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Error => write!(f, "error"),
        }
    }
}

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(AgentStatus::Idle.to_string(), "idle");
        assert_eq!(AgentStatus::Running.to_string(), "running");
        assert_eq!(AgentStatus::Stopped.to_string(), "stopped");
        assert_eq!(AgentStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_error_messages() {
        let err = AgentError::UnknownInstance("worker-1".to_string());
        assert_eq!(err.to_string(), "Unknown agent instance: worker-1");

        let err = AgentError::UnsupportedTaskType {
            agent: "classifier".to_string(),
            task_type: "translate".to_string(),
        };
        assert!(err.to_string().contains("classifier"));
        assert!(err.to_string().contains("translate"));
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
