//! Agent trait and construction types

use crate::capability::CapabilitySet;
use crate::task::Task;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Configuration passed to an agent factory at `create` time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Capacity of the instance's task queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Free-form per-type options
    #[serde(default)]
    pub options: HashMap<String, Value>,
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            options: HashMap::new(),
        }
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Add a free-form option
    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// A capability-providing worker unit
///
/// Implementations expose their declared task types through
/// [`capabilities`](Agent::capabilities) and execute one task at a time via
/// [`handle`](Agent::handle). The engine never inspects payload semantics;
/// it only moves opaque maps in and out.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The task types this agent accepts
    fn capabilities(&self) -> &CapabilitySet;

    /// Execute a single task, producing a result value or an error
    async fn handle(&self, task: &Task) -> Result<Value>;

    /// Optional health probe; defaults to a liveness-only check
    ///
    /// Agents with external resources (database handles, sockets) override
    /// this to report real health. Returning `false` counts as a failed
    /// probe toward the registry's unhealthy threshold.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Constructor for a registered agent type
pub trait AgentFactory: Send + Sync {
    /// Build a fresh agent instance from the given configuration
    fn build(&self, config: &AgentConfig) -> Result<Box<dyn Agent>>;
}

impl<F> AgentFactory for F
where
    F: Fn(&AgentConfig) -> Result<Box<dyn Agent>> + Send + Sync,
{
    fn build(&self, config: &AgentConfig) -> Result<Box<dyn Agent>> {
        self(config)
    }
}
