//! Read-only status and metrics snapshots
//!
//! Serializable views over one workflow or the coordinator in aggregate,
//! consumed by dashboards and CLIs outside this crate.

use crate::model::{StepStatus, Workflow, WorkflowStatus};
use chrono::Utc;
use serde::Serialize;

/// Snapshot of one step's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSnapshot {
    /// Step identifier
    pub id: String,
    /// Target agent instance name
    pub agent_name: String,
    /// Task type
    pub task_type: String,
    /// Current status
    pub status: StepStatus,
    /// Attempts made so far
    pub attempt_count: u32,
    /// Error text of the most recent failed attempt
    pub error: Option<String>,
}

/// Snapshot of one workflow's state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStatusSnapshot {
    /// Workflow identifier
    pub workflow_id: String,
    /// Workflow name
    pub name: String,
    /// Current status
    pub status: WorkflowStatus,
    /// Terminal steps as a percentage of all steps
    pub completion_percent: f64,
    /// Milliseconds since execution began, up to terminal status
    pub elapsed_ms: Option<u64>,
    /// Aggregate error when the workflow failed
    pub error: Option<String>,
    /// Per-step state
    pub steps: Vec<StepSnapshot>,
}

impl WorkflowStatusSnapshot {
    /// Build a snapshot from the workflow's current state
    pub fn capture(workflow: &Workflow) -> Self {
        let total = workflow.steps.len();
        let completion_percent = if total > 0 {
            workflow.terminal_step_count() as f64 / total as f64 * 100.0
        } else {
            100.0
        };

        let elapsed_ms = workflow.started_at.map(|started| {
            let end = workflow.completed_at.unwrap_or_else(Utc::now);
            end.signed_duration_since(started)
                .num_milliseconds()
                .max(0) as u64
        });

        Self {
            workflow_id: workflow.id.clone(),
            name: workflow.name.clone(),
            status: workflow.status,
            completion_percent,
            elapsed_ms,
            error: workflow.error.clone(),
            steps: workflow
                .steps
                .iter()
                .map(|step| StepSnapshot {
                    id: step.id.clone(),
                    agent_name: step.agent_name.clone(),
                    task_type: step.task_type.clone(),
                    status: step.status,
                    attempt_count: step.attempt_count,
                    error: step.error.clone(),
                })
                .collect(),
        }
    }
}

/// One row of the workflow listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSummary {
    /// Workflow identifier
    pub id: String,
    /// Workflow name
    pub name: String,
    /// Current status
    pub status: WorkflowStatus,
}

/// Aggregate coordinator metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorMetrics {
    /// Workflows known to the coordinator
    pub total_workflows: usize,
    /// Workflows currently running or paused
    pub running: usize,
    /// Workflows that completed
    pub completed: usize,
    /// Workflows that failed
    pub failed: usize,
    /// Workflows that were cancelled
    pub cancelled: usize,
    /// Average wall-clock time of terminal workflows in milliseconds
    pub average_completion_ms: f64,
    /// Completed workflows as a fraction of terminal workflows
    pub success_rate: f64,
}

impl CoordinatorMetrics {
    /// Fold workflow states into aggregate metrics
    pub fn compute<'a, I>(workflows: I) -> Self
    where
        I: IntoIterator<Item = &'a Workflow>,
    {
        let mut metrics = Self {
            total_workflows: 0,
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
            average_completion_ms: 0.0,
            success_rate: 0.0,
        };

        let mut total_completion_ms = 0.0;
        let mut timed = 0usize;

        for workflow in workflows {
            metrics.total_workflows += 1;
            match workflow.status {
                WorkflowStatus::Running | WorkflowStatus::Paused => metrics.running += 1,
                WorkflowStatus::Completed => metrics.completed += 1,
                WorkflowStatus::Failed => metrics.failed += 1,
                WorkflowStatus::Cancelled => metrics.cancelled += 1,
                WorkflowStatus::Pending => {}
            }

            if let (Some(started), Some(completed)) = (workflow.started_at, workflow.completed_at) {
                total_completion_ms +=
                    completed.signed_duration_since(started).num_milliseconds().max(0) as f64;
                timed += 1;
            }
        }

        if timed > 0 {
            metrics.average_completion_ms = total_completion_ms / timed as f64;
        }

        let terminal = metrics.completed + metrics.failed + metrics.cancelled;
        if terminal > 0 {
            metrics.success_rate = metrics.completed as f64 / terminal as f64;
        }

        metrics
    }
}
