//! Capability sets declaring which task types an agent accepts

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The set of task type names an agent declares it can run
///
/// The registry consults the capability set before enqueuing a task, so an
/// unsupported task type is rejected without ever reaching the agent's
/// queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    task_types: BTreeSet<String>,
}

impl CapabilitySet {
    /// Create an empty capability set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capability set from task type names
    pub fn from_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            task_types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a task type
    pub fn with_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_types.insert(task_type.into());
        self
    }

    /// Check whether the given task type is declared
    pub fn supports(&self, task_type: &str) -> bool {
        self.task_types.contains(task_type)
    }

    /// Iterate over the declared task types
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.task_types.iter().map(String::as_str)
    }

    /// Number of declared task types
    pub fn len(&self) -> usize {
        self.task_types.len()
    }

    /// Whether the set declares no task types
    pub fn is_empty(&self) -> bool {
        self.task_types.is_empty()
    }
}
