//! Workflow coordinator and DAG executor
//!
//! The coordinator owns every workflow instance and drives each running one
//! from a dedicated tokio task. Scheduling is wavefront-based: all ready
//! steps are dispatched together under a counting semaphore sized to the
//! workflow's parallelism cap, and the next readiness computation waits for
//! the whole batch. Cancelling a workflow aborts its driver task; the
//! wavefront's child tasks live in a `JoinSet` owned by that driver, so the
//! whole execution tree is torn down with it.

use crate::config::CoordinatorConfig;
use crate::context::WorkflowContext;
use crate::model::{FailureStrategy, StepStatus, Workflow, WorkflowStatus};
use crate::status::{CoordinatorMetrics, WorkflowStatusSnapshot, WorkflowSummary};
use crate::template::{TemplateRegistry, WorkflowTemplate};
use crate::{OrchestratorError, Result};
use agents::{AgentRegistry, BackoffPolicy, Task};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// One workflow plus its shared context
#[derive(Clone)]
struct WorkflowEntry {
    workflow: Arc<Mutex<Workflow>>,
    context: WorkflowContext,
}

/// Coordinates workflow instances over the agent pool
pub struct WorkflowCoordinator {
    registry: Arc<AgentRegistry>,
    config: CoordinatorConfig,
    backoff: BackoffPolicy,
    templates: TemplateRegistry,
    workflows: Arc<RwLock<HashMap<String, WorkflowEntry>>>,
    running: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl WorkflowCoordinator {
    /// Create a coordinator dispatching through the given registry
    pub fn new(registry: Arc<AgentRegistry>, config: CoordinatorConfig) -> Self {
        Self {
            registry,
            config,
            backoff: BackoffPolicy::default(),
            templates: TemplateRegistry::new(),
            workflows: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(Mutex::new(HashMap::new())),
            monitor: Mutex::new(None),
        }
    }

    /// Create a coordinator with default configuration
    pub fn with_defaults(registry: Arc<AgentRegistry>) -> Self {
        Self::new(registry, CoordinatorConfig::default())
    }

    /// Override the step retry backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// The template registry
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Register a workflow template; fails if the name is taken
    pub fn register_template(&self, template: WorkflowTemplate) -> Result<()> {
        self.templates.register(template)
    }

    /// Deep-copy a registered template into a new workflow with seed context
    pub fn instantiate_from_template(
        &self,
        template_name: &str,
        workflow_id: impl Into<String>,
        seed_context: HashMap<String, Value>,
    ) -> Result<String> {
        let template = self.templates.get(template_name).ok_or_else(|| {
            OrchestratorError::Validation(format!("unknown template '{}'", template_name))
        })?;

        let workflow = template.instantiate(workflow_id);
        self.insert_workflow(workflow, seed_context)
    }

    /// Add a workflow built directly from step definitions
    pub fn create_workflow(&self, workflow: Workflow) -> Result<String> {
        self.insert_workflow(workflow, HashMap::new())
    }

    /// Begin asynchronous execution of a workflow
    ///
    /// Fails if the id is unknown, the workflow is not pending, or the
    /// concurrent-workflow ceiling is reached. `extra_context` entries are
    /// merged into the shared context before the first wavefront.
    pub fn execute(&self, id: &str, extra_context: Option<HashMap<String, Value>>) -> Result<()> {
        let entry = self.entry(id)?;
        let mut running = self.running.lock();

        if running.contains_key(id) {
            return Err(OrchestratorError::Validation(format!(
                "workflow '{}' is already running",
                id
            )));
        }
        if running.len() >= self.config.max_concurrent_workflows {
            return Err(OrchestratorError::Validation(format!(
                "concurrent workflow limit reached ({})",
                self.config.max_concurrent_workflows
            )));
        }

        {
            let mut workflow = entry.workflow.lock();
            if workflow.status != WorkflowStatus::Pending {
                return Err(OrchestratorError::Validation(format!(
                    "workflow '{}' is not pending (status: {})",
                    id, workflow.status
                )));
            }
            workflow.status = WorkflowStatus::Running;
            workflow.started_at = Some(Utc::now());
        }

        if let Some(extra) = extra_context {
            entry.context.merge(extra);
        }

        info!(workflow = id, "Starting workflow execution");

        // The driver waits until its handle is registered so that it can
        // never try to deregister itself before insertion.
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let driver = {
            let entry = entry.clone();
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            let backoff = self.backoff.clone();
            let running = Arc::clone(&self.running);
            let id = id.to_string();
            async move {
                let _ = ready_rx.await;
                run_workflow(entry, registry, config, backoff).await;
                running.lock().remove(&id);
            }
        };

        running.insert(id.to_string(), tokio::spawn(driver));
        let _ = ready_tx.send(());
        Ok(())
    }

    /// Cancel a running workflow, tearing down its execution task tree
    pub fn cancel(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        self.cancel_entry(&entry, id, None)
    }

    /// Suspend scheduling; in-flight steps keep running
    pub fn pause(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let mut workflow = entry.workflow.lock();

        if workflow.status != WorkflowStatus::Running {
            return Err(OrchestratorError::Validation(format!(
                "workflow '{}' is not running (status: {})",
                id, workflow.status
            )));
        }
        workflow.status = WorkflowStatus::Paused;
        info!(workflow = id, "Workflow paused");
        Ok(())
    }

    /// Resume a paused workflow
    pub fn resume(&self, id: &str) -> Result<()> {
        let entry = self.entry(id)?;
        let mut workflow = entry.workflow.lock();

        if workflow.status != WorkflowStatus::Paused {
            return Err(OrchestratorError::Validation(format!(
                "workflow '{}' is not paused (status: {})",
                id, workflow.status
            )));
        }
        workflow.status = WorkflowStatus::Running;
        info!(workflow = id, "Workflow resumed");
        Ok(())
    }

    /// Snapshot one workflow's state
    pub fn status(&self, id: &str) -> Result<WorkflowStatusSnapshot> {
        let entry = self.entry(id)?;
        let workflow = entry.workflow.lock();
        Ok(WorkflowStatusSnapshot::capture(&workflow))
    }

    /// Copy of one workflow's shared context
    pub fn context(&self, id: &str) -> Result<HashMap<String, Value>> {
        Ok(self.entry(id)?.context.snapshot())
    }

    /// Aggregate metrics over all workflows
    pub fn metrics(&self) -> CoordinatorMetrics {
        let snapshot: Vec<Workflow> = {
            let workflows = self.workflows.read();
            workflows
                .values()
                .map(|entry| entry.workflow.lock().clone())
                .collect()
        };
        CoordinatorMetrics::compute(snapshot.iter())
    }

    /// Summaries of all workflows
    pub fn list_workflows(&self) -> Vec<WorkflowSummary> {
        let workflows = self.workflows.read();
        workflows
            .values()
            .map(|entry| {
                let workflow = entry.workflow.lock();
                WorkflowSummary {
                    id: workflow.id.clone(),
                    name: workflow.name.clone(),
                    status: workflow.status,
                }
            })
            .collect()
    }

    /// Spawn the global-timeout monitor loop; idempotent
    pub fn spawn_timeout_monitor(&self) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }

        let workflows = Arc::clone(&self.workflows);
        let running = Arc::clone(&self.running);
        let interval = self.config.timeout_monitor_interval();

        *monitor = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let expired: Vec<(String, WorkflowEntry)> = {
                    let map = workflows.read();
                    map.iter()
                        .filter(|(_, entry)| {
                            let workflow = entry.workflow.lock();
                            if workflow.status != WorkflowStatus::Running {
                                return false;
                            }
                            match (workflow.global_timeout, workflow.started_at) {
                                (Some(timeout), Some(started)) => {
                                    let elapsed = Utc::now()
                                        .signed_duration_since(started)
                                        .to_std()
                                        .unwrap_or(Duration::ZERO);
                                    elapsed >= timeout
                                }
                                _ => false,
                            }
                        })
                        .map(|(id, entry)| (id.clone(), entry.clone()))
                        .collect()
                };

                for (id, entry) in expired {
                    warn!(workflow = %id, "Global timeout exceeded, cancelling workflow");
                    if let Err(e) = cancel_entry_inner(
                        &entry,
                        &running,
                        &id,
                        Some("global timeout exceeded".to_string()),
                    ) {
                        debug!(workflow = %id, error = %e, "Timeout cancellation skipped");
                    }
                }
            }
        }));
    }

    /// Stop the monitor loop and cancel every running workflow
    pub fn shutdown(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }

        let ids: Vec<String> = self.running.lock().keys().cloned().collect();
        for id in ids {
            if let Ok(entry) = self.entry(&id) {
                let _ = self.cancel_entry(&entry, &id, Some("coordinator shutdown".to_string()));
            }
        }
        info!("Coordinator shut down");
    }

    fn entry(&self, id: &str) -> Result<WorkflowEntry> {
        self.workflows
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::Validation(format!("unknown workflow '{}'", id)))
    }

    fn cancel_entry(&self, entry: &WorkflowEntry, id: &str, reason: Option<String>) -> Result<()> {
        cancel_entry_inner(entry, &self.running, id, reason)
    }

    fn insert_workflow(
        &self,
        workflow: Workflow,
        seed_context: HashMap<String, Value>,
    ) -> Result<String> {
        validate_workflow(&workflow)?;

        let id = workflow.id.clone();
        let mut workflows = self.workflows.write();
        if workflows.contains_key(&id) {
            return Err(OrchestratorError::Validation(format!(
                "duplicate workflow id '{}'",
                id
            )));
        }

        debug!(workflow = %id, steps = workflow.steps.len(), "Created workflow");
        workflows.insert(
            id.clone(),
            WorkflowEntry {
                workflow: Arc::new(Mutex::new(workflow)),
                context: WorkflowContext::from_map(seed_context),
            },
        );
        Ok(id)
    }
}

fn cancel_entry_inner(
    entry: &WorkflowEntry,
    running: &Mutex<HashMap<String, JoinHandle<()>>>,
    id: &str,
    reason: Option<String>,
) -> Result<()> {
    {
        let workflow = entry.workflow.lock();
        if workflow.status.is_terminal() {
            return Err(OrchestratorError::Validation(format!(
                "workflow '{}' is already {}",
                id, workflow.status
            )));
        }
    }

    let handle = running.lock().remove(id).ok_or_else(|| {
        OrchestratorError::Validation(format!("workflow '{}' is not running", id))
    })?;
    handle.abort();

    let mut workflow = entry.workflow.lock();
    if !workflow.status.is_terminal() {
        workflow.status = WorkflowStatus::Cancelled;
        workflow.completed_at = Some(Utc::now());
        if reason.is_some() {
            workflow.error = reason;
        }
    }

    info!(workflow = id, "Workflow cancelled");
    Ok(())
}

/// Reject definitions the executor cannot drive to completion
fn validate_workflow(workflow: &Workflow) -> Result<()> {
    if workflow.max_parallel_steps == 0 {
        return Err(OrchestratorError::Validation(
            "max_parallel_steps must be at least 1".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for step in &workflow.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(OrchestratorError::Validation(format!(
                "duplicate step id '{}'",
                step.id
            )));
        }
    }

    for step in &workflow.steps {
        for dep in &step.dependencies {
            if !ids.contains(dep.as_str()) {
                return Err(OrchestratorError::Validation(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
    }

    // Kahn's algorithm; anything left unvisited sits on a cycle.
    let mut indegree: HashMap<&str, usize> = workflow
        .steps
        .iter()
        .map(|s| (s.id.as_str(), s.dependencies.len()))
        .collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &workflow.steps {
        for dep in &step.dependencies {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(step.id.as_str());
        }
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut visited = 0usize;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for &dependent in dependents.get(id).into_iter().flatten() {
            if let Some(degree) = indegree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if visited < workflow.steps.len() {
        return Err(OrchestratorError::Validation(
            "workflow contains a dependency cycle".to_string(),
        ));
    }

    Ok(())
}

/// Drive one workflow to a terminal status
async fn run_workflow(
    entry: WorkflowEntry,
    registry: Arc<AgentRegistry>,
    config: CoordinatorConfig,
    backoff: BackoffPolicy,
) {
    let idle = config.idle_poll();
    let (workflow_id, max_parallel, strategy) = {
        let workflow = entry.workflow.lock();
        (
            workflow.id.clone(),
            workflow.max_parallel_steps,
            workflow.failure_strategy,
        )
    };
    let semaphore = Arc::new(Semaphore::new(max_parallel));
    let mut retried_failed = false;

    loop {
        // Pause gate: scheduling is suspended while paused.
        loop {
            let status = entry.workflow.lock().status;
            match status {
                WorkflowStatus::Paused => tokio::time::sleep(idle).await,
                WorkflowStatus::Running => break,
                _ => return,
            }
        }

        // Under Stop, a failed step ends scheduling; steps depending on it
        // stay waiting.
        if strategy == FailureStrategy::Stop && entry.workflow.lock().has_failed_step() {
            break;
        }

        let dispatch = {
            let mut workflow = entry.workflow.lock();
            let terminal: HashSet<String> = workflow
                .steps
                .iter()
                .filter(|s| s.status.is_terminal())
                .map(|s| s.id.clone())
                .collect();

            let ready: Vec<String> = workflow
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Waiting)
                .filter(|s| s.dependencies.iter().all(|d| terminal.contains(d)))
                .map(|s| s.id.clone())
                .collect();

            // Gated steps are skipped immediately without a concurrency slot.
            let context = entry.context.snapshot();
            let mut dispatch = Vec::new();
            for id in ready {
                let Some(step) = workflow.step_mut(&id) else {
                    continue;
                };
                let passes = step
                    .condition
                    .as_ref()
                    .map_or(true, |cond| cond.evaluate(&context));
                if passes {
                    dispatch.push(id);
                } else {
                    debug!(workflow = %workflow_id, step = %id, "Gating condition false, skipping step");
                    step.status = StepStatus::Skipped;
                    step.completed_at = Some(Utc::now());
                }
            }
            dispatch
        };

        if dispatch.is_empty() {
            let non_terminal = {
                let workflow = entry.workflow.lock();
                workflow.steps.len() - workflow.terminal_step_count()
            };

            if non_terminal == 0 {
                if strategy == FailureStrategy::RetryFailed
                    && !retried_failed
                    && entry.workflow.lock().has_failed_step()
                {
                    let mut workflow = entry.workflow.lock();
                    for step in workflow
                        .steps
                        .iter_mut()
                        .filter(|s| s.status == StepStatus::Failed)
                    {
                        step.status = StepStatus::Waiting;
                        step.completed_at = None;
                    }
                    retried_failed = true;
                    info!(workflow = %workflow_id, "Re-running failed steps");
                    continue;
                }
                break;
            }

            tokio::time::sleep(idle).await;
            continue;
        }

        debug!(workflow = %workflow_id, wavefront = dispatch.len(), "Dispatching wavefront");

        // Wavefront barrier: the whole batch finishes before readiness is
        // recomputed, so stragglers block the next wave.
        let mut wavefront = JoinSet::new();
        for step_id in dispatch {
            wavefront.spawn(execute_step(
                step_id,
                entry.clone(),
                Arc::clone(&registry),
                backoff.clone(),
                Arc::clone(&semaphore),
            ));
        }
        while wavefront.join_next().await.is_some() {}
    }

    let mut workflow = entry.workflow.lock();
    if workflow.status.is_terminal() {
        return;
    }

    let failed: Vec<String> = workflow
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Failed)
        .map(|s| {
            format!(
                "{} ({})",
                s.id,
                s.error.clone().unwrap_or_else(|| "unknown error".to_string())
            )
        })
        .collect();

    if strategy == FailureStrategy::Stop && !failed.is_empty() {
        workflow.status = WorkflowStatus::Failed;
        workflow.error = Some(format!("{} step(s) failed: {}", failed.len(), failed.join("; ")));
        warn!(workflow = %workflow_id, failed = failed.len(), "Workflow failed");
    } else {
        workflow.status = WorkflowStatus::Completed;
        info!(workflow = %workflow_id, "Workflow completed");
    }
    workflow.completed_at = Some(Utc::now());
}

/// Execute one step: resolve templates, dispatch, retry with backoff
async fn execute_step(
    step_id: String,
    entry: WorkflowEntry,
    registry: Arc<AgentRegistry>,
    backoff: BackoffPolicy,
    semaphore: Arc<Semaphore>,
) {
    // One slot covers the step's whole attempt series, backoff included.
    let _permit = match Arc::clone(&semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    let (workflow_id, agent_name, task_type, task_data, retry_attempts, timeout) = {
        let mut workflow = entry.workflow.lock();
        let workflow_id = workflow.id.clone();
        let Some(step) = workflow.step_mut(&step_id) else {
            return;
        };
        step.status = StepStatus::Running;
        step.started_at = Some(Utc::now());
        (
            workflow_id,
            step.agent_name.clone(),
            step.task_type.clone(),
            step.task_data.clone(),
            step.retry_attempts,
            step.timeout,
        )
    };

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        {
            let mut workflow = entry.workflow.lock();
            if let Some(step) = workflow.step_mut(&step_id) {
                step.attempt_count += 1;
            }
        }

        let resolved = entry.context.resolve_map(&task_data);
        let task = Task::new(task_type.clone())
            .with_input_map(resolved)
            .with_max_retries(retry_attempts);

        debug!(workflow = %workflow_id, step = %step_id, attempt = attempt, "Dispatching step");

        let outcome = match timeout {
            Some(t) => registry.execute_with_timeout(&agent_name, task, t).await,
            None => registry.execute(&agent_name, task).await,
        };

        match outcome {
            Ok(value) => {
                entry.context.merge_step_result(&step_id, &value);
                let mut workflow = entry.workflow.lock();
                if let Some(step) = workflow.step_mut(&step_id) {
                    step.status = StepStatus::Completed;
                    step.result = Some(value);
                    step.error = None;
                    step.completed_at = Some(Utc::now());
                }
                info!(workflow = %workflow_id, step = %step_id, attempt = attempt, "Step completed");
                return;
            }
            Err(e) => {
                {
                    let mut workflow = entry.workflow.lock();
                    if let Some(step) = workflow.step_mut(&step_id) {
                        step.error = Some(e.to_string());
                    }
                }

                if attempt <= retry_attempts {
                    let delay = backoff.delay(attempt - 1);
                    warn!(
                        workflow = %workflow_id,
                        step = %step_id,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Step failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    let mut workflow = entry.workflow.lock();
                    if let Some(step) = workflow.step_mut(&step_id) {
                        step.status = StepStatus::Failed;
                        step.completed_at = Some(Utc::now());
                    }
                    warn!(
                        workflow = %workflow_id,
                        step = %step_id,
                        attempts = attempt,
                        error = %e,
                        "Step failed permanently"
                    );
                    return;
                }
            }
        }
    }
}
