//! Workflow and step data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Step execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not yet dispatched; dependencies may still be outstanding
    Waiting,
    /// Dispatched to an agent (covers retry backoff between attempts)
    Running,
    /// Finished successfully
    Completed,
    /// Retry budget exhausted
    Failed,
    /// Gating condition evaluated false
    Skipped,
}

impl StepStatus {
    /// Whether this status ends the step's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Waiting => "waiting",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Workflow execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, not yet executed
    Pending,
    /// Driver task is scheduling wavefronts
    Running,
    /// Scheduling suspended; in-flight steps keep running
    Paused,
    /// All steps terminal without triggering the failure strategy
    Completed,
    /// At least one step failed under the `Stop` strategy
    Failed,
    /// Cancelled by a caller or the global timeout monitor
    Cancelled,
}

impl WorkflowStatus {
    /// Whether this status ends the workflow's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Paused => "paused",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// What to do when a step exhausts its retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// Stop scheduling; the workflow fails with an aggregate error
    Stop,
    /// Keep scheduling; the workflow still classifies as completed
    Continue,
    /// Reset failed steps to waiting once and run one more pass
    RetryFailed,
}

impl Default for FailureStrategy {
    fn default() -> Self {
        FailureStrategy::Stop
    }
}

/// Gating predicate evaluated against the shared context
///
/// A ready step whose condition evaluates false is skipped immediately and
/// consumes no concurrency slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepCondition {
    /// Key is present and truthy (non-null, non-false, non-empty, non-zero)
    ContextTruthy { key: String },
    /// Key is present and equal to the given value
    ContextEquals { key: String, value: Value },
}

impl StepCondition {
    /// Evaluate against a context snapshot
    pub fn evaluate(&self, context: &HashMap<String, Value>) -> bool {
        match self {
            StepCondition::ContextTruthy { key } => {
                context.get(key).map_or(false, is_truthy)
            }
            StepCondition::ContextEquals { key, value } => {
                context.get(key).map_or(false, |v| v == value)
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// One node of a workflow DAG
///
/// Binds a task type and templated input to a target agent, plus the
/// upstream step ids that must reach a terminal status first. Status is
/// mutated only by the executor of the owning workflow.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    /// Step identifier, unique within the workflow
    pub id: String,
    /// Target agent instance name
    pub agent_name: String,
    /// Task type dispatched to the agent
    pub task_type: String,
    /// Templated input; string values may contain `${name}` placeholders
    pub task_data: HashMap<String, Value>,
    /// Upstream step ids
    pub dependencies: Vec<String>,
    /// Retries allowed after the first attempt
    pub retry_attempts: u32,
    /// Per-step dispatch timeout; the registry default applies when unset
    pub timeout: Option<Duration>,
    /// Optional gating predicate
    pub condition: Option<StepCondition>,
    /// Current status
    pub status: StepStatus,
    /// Raw result of the successful attempt
    pub result: Option<Value>,
    /// Error text of the most recent failed attempt
    pub error: Option<String>,
    /// Attempts made so far, across all passes
    pub attempt_count: u32,
    /// When the first attempt was dispatched
    pub started_at: Option<DateTime<Utc>>,
    /// When the step reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    /// Create a step with no dependencies and an empty input
    pub fn new(
        id: impl Into<String>,
        agent_name: impl Into<String>,
        task_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_name: agent_name.into(),
            task_type: task_type.into(),
            task_data: HashMap::new(),
            dependencies: Vec::new(),
            retry_attempts: 0,
            timeout: None,
            condition: None,
            status: StepStatus::Waiting,
            result: None,
            error: None,
            attempt_count: 0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Add a templated input entry
    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.task_data.insert(key.into(), value);
        self
    }

    /// Add an upstream dependency
    pub fn with_dependency(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.push(step_id.into());
        self
    }

    /// Set the retry budget
    pub fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    /// Set the per-step dispatch timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the gating condition
    pub fn with_condition(mut self, condition: StepCondition) -> Self {
        self.condition = Some(condition);
        self
    }
}

/// A DAG of steps executed under a concurrency cap and failure policy
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Workflow identifier, unique within the coordinator
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Ordered steps
    pub steps: Vec<WorkflowStep>,
    /// Maximum concurrently running steps
    pub max_parallel_steps: usize,
    /// Wall-clock budget for the whole run
    pub global_timeout: Option<Duration>,
    /// Failure policy
    pub failure_strategy: FailureStrategy,
    /// Current status
    pub status: WorkflowStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When execution began
    pub started_at: Option<DateTime<Utc>>,
    /// When the workflow reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Aggregate error when the workflow failed
    pub error: Option<String>,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            steps: Vec::new(),
            max_parallel_steps: 4,
            global_timeout: None,
            failure_strategy: FailureStrategy::default(),
            status: WorkflowStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a step
    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the parallelism cap
    pub fn with_max_parallel_steps(mut self, cap: usize) -> Self {
        self.max_parallel_steps = cap;
        self
    }

    /// Set the global timeout
    pub fn with_global_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = Some(timeout);
        self
    }

    /// Set the failure strategy
    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.failure_strategy = strategy;
        self
    }

    /// Look up a step by id
    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Look up a step mutably by id
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut WorkflowStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }

    /// Count steps in a terminal status
    pub fn terminal_step_count(&self) -> usize {
        self.steps.iter().filter(|s| s.status.is_terminal()).count()
    }

    /// Whether any step failed
    pub fn has_failed_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_status_terminality() {
        assert!(!StepStatus::Waiting.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_workflow_status_terminality() {
        assert!(!WorkflowStatus::Pending.is_terminal());
        assert!(!WorkflowStatus::Paused.is_terminal());
        assert!(WorkflowStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_condition_truthy() {
        let mut context = HashMap::new();
        context.insert("flag".to_string(), json!(true));
        context.insert("empty".to_string(), json!(""));
        context.insert("zero".to_string(), json!(0));
        context.insert("text".to_string(), json!("yes"));

        let truthy = |key: &str| StepCondition::ContextTruthy { key: key.to_string() };
        assert!(truthy("flag").evaluate(&context));
        assert!(truthy("text").evaluate(&context));
        assert!(!truthy("empty").evaluate(&context));
        assert!(!truthy("zero").evaluate(&context));
        assert!(!truthy("missing").evaluate(&context));
    }

    #[test]
    fn test_condition_equals() {
        let mut context = HashMap::new();
        context.insert("category".to_string(), json!("apparel"));

        let cond = StepCondition::ContextEquals {
            key: "category".to_string(),
            value: json!("apparel"),
        };
        assert!(cond.evaluate(&context));

        let cond = StepCondition::ContextEquals {
            key: "category".to_string(),
            value: json!("home"),
        };
        assert!(!cond.evaluate(&context));
    }

    #[test]
    fn test_condition_serde() {
        let yaml = r#"
type: context_equals
key: category
value: apparel
"#;
        let cond: StepCondition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cond,
            StepCondition::ContextEquals {
                key: "category".to_string(),
                value: json!("apparel"),
            }
        );
    }

    #[test]
    fn test_workflow_builder() {
        let workflow = Workflow::new("wf-1", "classify batch")
            .with_description("two-step pipeline")
            .with_max_parallel_steps(2)
            .with_failure_strategy(FailureStrategy::Continue)
            .with_step(WorkflowStep::new("a", "cls-1", "classify"))
            .with_step(
                WorkflowStep::new("b", "enr-1", "enrich")
                    .with_dependency("a")
                    .with_retry_attempts(2),
            );

        assert_eq!(workflow.steps.len(), 2);
        assert_eq!(workflow.step("b").unwrap().dependencies, vec!["a"]);
        assert_eq!(workflow.status, WorkflowStatus::Pending);
        assert_eq!(workflow.terminal_step_count(), 0);
        assert!(!workflow.has_failed_step());
    }
}
