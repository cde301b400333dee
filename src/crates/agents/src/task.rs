//! Task descriptor passed to agents for execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// A unit of work dispatched to a single agent
///
/// A task is created per dispatch and owned by the worker processing it.
/// Everything except the outcome fields (`result`, `error`, timestamps,
/// `attempts`) is immutable after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: Uuid,
    /// Task type, matched against the agent's capability set
    pub task_type: String,
    /// Opaque input payload; the engine never inspects its semantics
    pub input: HashMap<String, Value>,
    /// Scheduling priority
    #[serde(default)]
    pub priority: TaskPriority,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the agent began processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the agent finished processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Result payload on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts made so far (including the current one)
    #[serde(default)]
    pub attempts: u32,
    /// Retry budget for this task
    #[serde(default)]
    pub max_retries: u32,
}

impl Task {
    /// Create a new task of the given type
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            input: HashMap::new(),
            priority: TaskPriority::Normal,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            attempts: 0,
            max_retries: 0,
        }
    }

    /// Add a single input entry
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input.insert(key.into(), value);
        self
    }

    /// Replace the input payload wholesale
    pub fn with_input_map(mut self, input: HashMap<String, Value>) -> Self {
        self.input = input;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Mark the task as started
    pub fn mark_started(&mut self) {
        self.attempts += 1;
        self.started_at = Some(Utc::now());
    }

    /// Record a successful outcome
    pub fn mark_completed(&mut self, result: Value) {
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    /// Record a failed outcome
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }
}
