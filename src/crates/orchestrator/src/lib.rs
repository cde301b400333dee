//! Workflow coordination engine for colonylib
//!
//! This crate drives named DAG workflows over the agent pool: it resolves
//! step dependencies, dispatches ready steps in wavefronts bounded by a
//! per-workflow parallelism cap, propagates step outputs through a shared
//! context with `${name}` template resolution, and enforces retry budgets
//! and global timeouts. Workflows are created directly or instantiated
//! from reusable templates.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod model;
pub mod status;
pub mod template;

pub use config::CoordinatorConfig;
pub use context::WorkflowContext;
pub use coordinator::WorkflowCoordinator;
pub use model::{
    FailureStrategy, StepCondition, StepStatus, Workflow, WorkflowStatus, WorkflowStep,
};
pub use status::{CoordinatorMetrics, StepSnapshot, WorkflowStatusSnapshot, WorkflowSummary};
pub use template::{StepTemplate, TemplateRegistry, WorkflowTemplate};

use thiserror::Error;

/// Errors that can occur during workflow coordination
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid input: unknown or duplicate ids, invalid transitions,
    /// malformed definitions, the concurrent-workflow ceiling
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error surfaced from the agent layer
    #[error(transparent)]
    Agent(#[from] agents::AgentError),

    /// Configuration loading or parsing error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Get version information
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
