//! Workflow templates
//!
//! A template is a reusable, parameterizable workflow blueprint. It is the
//! engine's sole wire format: templates serialize to and from YAML or JSON
//! documents and instantiate into concrete workflows by deep copy.

use crate::model::{FailureStrategy, StepCondition, Workflow, WorkflowStep};
use crate::{OrchestratorError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One step of a workflow template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Step identifier, unique within the template
    pub id: String,
    /// Target agent instance name
    pub agent_name: String,
    /// Task type dispatched to the agent
    pub task_type: String,
    /// Templated input; string values may contain `${name}` placeholders
    #[serde(default)]
    pub task_data: HashMap<String, Value>,
    /// Upstream step ids
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Retries allowed after the first attempt
    #[serde(default)]
    pub retry_attempts: u32,
    /// Per-step dispatch timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Optional gating predicate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
}

impl StepTemplate {
    fn to_step(&self) -> WorkflowStep {
        let mut step = WorkflowStep::new(&self.id, &self.agent_name, &self.task_type);
        step.task_data = self.task_data.clone();
        step.dependencies = self.dependencies.clone();
        step.retry_attempts = self.retry_attempts;
        step.timeout = self.timeout_ms.map(Duration::from_millis);
        step.condition = self.condition.clone();
        step
    }
}

/// A reusable workflow blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    /// Template name, unique within the registry
    pub name: String,
    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Step blueprints
    pub steps: Vec<StepTemplate>,
    /// Maximum concurrently running steps
    #[serde(default = "default_max_parallel_steps")]
    pub max_parallel_steps: usize,
    /// Wall-clock budget for a whole run, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_timeout_ms: Option<u64>,
    /// Failure policy
    #[serde(default)]
    pub failure_strategy: FailureStrategy,
}

fn default_max_parallel_steps() -> usize {
    4
}

impl WorkflowTemplate {
    /// Parse a template from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| OrchestratorError::Config(format!("Invalid template YAML: {}", e)))
    }

    /// Parse a template from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| OrchestratorError::Config(format!("Invalid template JSON: {}", e)))
    }

    /// Load a template from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Deep-copy this blueprint into a concrete workflow bound to an id
    pub fn instantiate(&self, workflow_id: impl Into<String>) -> Workflow {
        let mut workflow = Workflow::new(workflow_id, &self.name)
            .with_max_parallel_steps(self.max_parallel_steps)
            .with_failure_strategy(self.failure_strategy);
        workflow.description = self.description.clone();
        workflow.global_timeout = self.global_timeout_ms.map(Duration::from_millis);
        workflow.steps = self.steps.iter().map(StepTemplate::to_step).collect();
        workflow
    }
}

/// Thread-safe registry of named workflow templates
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Arc<RwLock<HashMap<String, WorkflowTemplate>>>,
}

impl TemplateRegistry {
    /// Create an empty template registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template; fails if the name is taken
    pub fn register(&self, template: WorkflowTemplate) -> Result<()> {
        let mut templates = self.templates.write();
        if templates.contains_key(&template.name) {
            return Err(OrchestratorError::Validation(format!(
                "template '{}' already registered",
                template.name
            )));
        }
        debug!(template = %template.name, steps = template.steps.len(), "Registered template");
        templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Register or overwrite a template
    pub fn register_or_update(&self, template: WorkflowTemplate) {
        self.templates
            .write()
            .insert(template.name.clone(), template);
    }

    /// Get a template by name
    pub fn get(&self, name: &str) -> Option<WorkflowTemplate> {
        self.templates.read().get(name).cloned()
    }

    /// Names of all registered templates
    pub fn list_names(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }

    /// Number of registered templates
    pub fn count(&self) -> usize {
        self.templates.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepStatus;
    use serde_json::json;

    const TEMPLATE_YAML: &str = r#"
name: classify_and_enrich
description: Classification pipeline
steps:
  - id: classify
    agent_name: cls-1
    task_type: classify
    task_data:
      description: "${product_description}"
  - id: enrich
    agent_name: enr-1
    task_type: enrich
    task_data:
      description: "${product_description}"
    dependencies: [classify]
    retry_attempts: 2
    timeout_ms: 5000
max_parallel_steps: 2
failure_strategy: stop
"#;

    #[test]
    fn test_parse_yaml_template() {
        let template = WorkflowTemplate::from_yaml_str(TEMPLATE_YAML).unwrap();
        assert_eq!(template.name, "classify_and_enrich");
        assert_eq!(template.steps.len(), 2);
        assert_eq!(template.steps[1].dependencies, vec!["classify"]);
        assert_eq!(template.steps[1].timeout_ms, Some(5000));
        assert_eq!(template.max_parallel_steps, 2);
        assert_eq!(template.failure_strategy, FailureStrategy::Stop);
    }

    #[test]
    fn test_template_defaults() {
        let yaml = r#"
name: minimal
steps:
  - id: only
    agent_name: w
    task_type: classify
"#;
        let template = WorkflowTemplate::from_yaml_str(yaml).unwrap();
        assert_eq!(template.max_parallel_steps, 4);
        assert_eq!(template.failure_strategy, FailureStrategy::Stop);
        assert!(template.global_timeout_ms.is_none());
        assert!(template.steps[0].task_data.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = WorkflowTemplate::from_yaml_str("name: [unclosed").unwrap_err();
        assert!(matches!(err, OrchestratorError::Config(_)));
    }

    #[test]
    fn test_instantiate_structural_round_trip() {
        let template = WorkflowTemplate::from_yaml_str(TEMPLATE_YAML).unwrap();
        let workflow = template.instantiate("wf-1");

        assert_eq!(workflow.id, "wf-1");
        assert_eq!(workflow.name, template.name);
        assert_eq!(workflow.steps.len(), template.steps.len());
        for (step, blueprint) in workflow.steps.iter().zip(&template.steps) {
            assert_eq!(step.id, blueprint.id);
            assert_eq!(step.task_type, blueprint.task_type);
            assert_eq!(step.dependencies, blueprint.dependencies);
            assert_eq!(step.status, StepStatus::Waiting);
            assert_eq!(step.attempt_count, 0);
        }
    }

    #[test]
    fn test_instantiate_is_deep_copy() {
        let template = WorkflowTemplate::from_yaml_str(TEMPLATE_YAML).unwrap();
        let mut workflow = template.instantiate("wf-1");
        workflow.steps[0]
            .task_data
            .insert("extra".to_string(), json!(1));

        assert!(template.steps[0].task_data.get("extra").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let template = WorkflowTemplate::from_yaml_str(TEMPLATE_YAML).unwrap();
        let encoded = serde_json::to_string(&template).unwrap();
        let decoded = WorkflowTemplate::from_json_str(&encoded).unwrap();
        assert_eq!(decoded, template);
    }

    #[test]
    fn test_registry_register_and_duplicate() {
        let registry = TemplateRegistry::new();
        let template = WorkflowTemplate::from_yaml_str(TEMPLATE_YAML).unwrap();

        registry.register(template.clone()).unwrap();
        assert_eq!(registry.count(), 1);
        assert!(registry.get("classify_and_enrich").is_some());

        let err = registry.register(template.clone()).unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));

        registry.register_or_update(template);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEMPLATE_YAML.as_bytes()).unwrap();

        let template = WorkflowTemplate::from_yaml_file(file.path()).unwrap();
        assert_eq!(template.name, "classify_and_enrich");
    }
}
