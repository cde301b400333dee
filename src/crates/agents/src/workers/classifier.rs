//! Keyword-table classification agent

use crate::agent::{Agent, AgentConfig};
use crate::capability::CapabilitySet;
use crate::task::Task;
use crate::{AgentError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Operations the classifier dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassifierOp {
    /// Assign a category from the keyword table
    Classify,
    /// Like `Classify`, but returns candidate categories ranked
    Categorize,
}

impl ClassifierOp {
    fn parse(task_type: &str) -> Option<Self> {
        match task_type {
            "classify" => Some(ClassifierOp::Classify),
            "categorize" => Some(ClassifierOp::Categorize),
            _ => None,
        }
    }
}

/// Fixed keyword lookup table: (category, keywords)
const KEYWORD_TABLE: &[(&str, &[&str])] = &[
    ("apparel", &["shirt", "jacket", "denim", "dress", "cotton", "wool", "sneaker"]),
    ("electronics", &["phone", "laptop", "camera", "headphone", "battery", "usb"]),
    ("home", &["sofa", "lamp", "kitchen", "cushion", "curtain", "table"]),
    ("grocery", &["organic", "coffee", "tea", "chocolate", "pasta", "sauce"]),
];

/// Agent assigning categories by keyword matching against a fixed table
pub struct ClassifierAgent {
    caps: CapabilitySet,
}

impl ClassifierAgent {
    pub fn new() -> Self {
        Self {
            caps: CapabilitySet::from_types(["classify", "categorize"]),
        }
    }

    fn score(description: &str) -> Vec<(&'static str, usize)> {
        let lowered = description.to_lowercase();
        let mut scores: Vec<(&'static str, usize)> = KEYWORD_TABLE
            .iter()
            .map(|(category, keywords)| {
                let hits = keywords.iter().filter(|k| lowered.contains(*k)).count();
                (*category, hits)
            })
            .filter(|(_, hits)| *hits > 0)
            .collect();
        scores.sort_by(|a, b| b.1.cmp(&a.1));
        scores
    }
}

impl Default for ClassifierAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ClassifierAgent {
    fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    async fn handle(&self, task: &Task) -> Result<Value> {
        let op = ClassifierOp::parse(&task.task_type).ok_or_else(|| {
            AgentError::UnsupportedTaskType {
                agent: "classifier".to_string(),
                task_type: task.task_type.clone(),
            }
        })?;

        let description = task
            .input
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::TaskFailed("missing 'description' input".to_string()))?;

        let scores = Self::score(description);

        match op {
            ClassifierOp::Classify => {
                let (category, hits) = scores.first().copied().unwrap_or(("unknown", 0));
                let total_keywords: usize = KEYWORD_TABLE
                    .iter()
                    .find(|(c, _)| *c == category)
                    .map(|(_, ks)| ks.len())
                    .unwrap_or(1);
                let confidence = hits as f64 / total_keywords as f64;

                Ok(json!({
                    "category": category,
                    "confidence": confidence,
                    "keyword_hits": hits,
                }))
            }
            ClassifierOp::Categorize => {
                let candidates: Vec<Value> = scores
                    .iter()
                    .map(|(category, hits)| json!({ "category": category, "keyword_hits": hits }))
                    .collect();
                Ok(json!({ "candidates": candidates }))
            }
        }
    }
}

/// Factory for the `classifier` agent type
pub fn factory(_config: &AgentConfig) -> Result<Box<dyn Agent>> {
    Ok(Box::new(ClassifierAgent::new()))
}
