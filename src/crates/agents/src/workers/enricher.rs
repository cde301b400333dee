//! Attribute enrichment agent

use crate::agent::{Agent, AgentConfig};
use crate::capability::CapabilitySet;
use crate::task::Task;
use crate::{AgentError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

/// Operations the enricher dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnricherOp {
    /// Full enrichment: tags, counts and detected attributes
    Enrich,
    /// Attribute detection only
    ExtractAttributes,
}

impl EnricherOp {
    fn parse(task_type: &str) -> Option<Self> {
        match task_type {
            "enrich" => Some(EnricherOp::Enrich),
            "extract_attributes" => Some(EnricherOp::ExtractAttributes),
            _ => None,
        }
    }
}

const COLORS: &[&str] = &["red", "blue", "green", "black", "white", "grey", "yellow"];
const MATERIALS: &[&str] = &["cotton", "wool", "denim", "leather", "plastic", "steel", "glass"];
const SIZES: &[&str] = &["small", "medium", "large", "xl", "xxl"];

/// Agent deriving normalized attributes from a free-text description
pub struct EnricherAgent {
    caps: CapabilitySet,
}

impl EnricherAgent {
    pub fn new() -> Self {
        Self {
            caps: CapabilitySet::from_types(["enrich", "extract_attributes"]),
        }
    }

    fn detect(lowered: &str, table: &[&str]) -> Vec<String> {
        table
            .iter()
            .filter(|entry| lowered.contains(*entry))
            .map(|entry| entry.to_string())
            .collect()
    }

    fn attributes(description: &str) -> Map<String, Value> {
        let lowered = description.to_lowercase();
        let mut attrs = Map::new();

        let colors = Self::detect(&lowered, COLORS);
        if !colors.is_empty() {
            attrs.insert("colors".to_string(), json!(colors));
        }
        let materials = Self::detect(&lowered, MATERIALS);
        if !materials.is_empty() {
            attrs.insert("materials".to_string(), json!(materials));
        }
        let sizes = Self::detect(&lowered, SIZES);
        if !sizes.is_empty() {
            attrs.insert("sizes".to_string(), json!(sizes));
        }

        attrs
    }
}

impl Default for EnricherAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for EnricherAgent {
    fn capabilities(&self) -> &CapabilitySet {
        &self.caps
    }

    async fn handle(&self, task: &Task) -> Result<Value> {
        let op = EnricherOp::parse(&task.task_type).ok_or_else(|| {
            AgentError::UnsupportedTaskType {
                agent: "enricher".to_string(),
                task_type: task.task_type.clone(),
            }
        })?;

        let description = task
            .input
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AgentError::TaskFailed("missing 'description' input".to_string()))?;

        let attributes = Self::attributes(description);

        match op {
            EnricherOp::Enrich => {
                let words: Vec<&str> = description.split_whitespace().collect();
                let tags: Vec<String> = words
                    .iter()
                    .filter(|w| w.len() > 3)
                    .map(|w| w.to_lowercase())
                    .collect();

                Ok(json!({
                    "word_count": words.len(),
                    "tags": tags,
                    "attributes": Value::Object(attributes),
                }))
            }
            EnricherOp::ExtractAttributes => Ok(json!({ "attributes": Value::Object(attributes) })),
        }
    }
}

/// Factory for the `enricher` agent type
pub fn factory(_config: &AgentConfig) -> Result<Box<dyn Agent>> {
    Ok(Box::new(EnricherAgent::new()))
}
