//! Agent registry and lifecycle manager
//!
//! The registry binds agent type names to factories, creates and starts
//! named worker instances, and exposes the timeout-bounded, retry-capable
//! `execute` primitive the workflow coordinator dispatches through. Two
//! independent background loops probe worker health (restarting workers
//! that fail three consecutive probes) and prune rolling metrics.

use crate::agent::{AgentConfig, AgentFactory};
use crate::config::RegistryConfig;
use crate::health::HealthSnapshot;
use crate::metrics::{AggregateMetrics, WorkerMetricsSnapshot};
use crate::retry::BackoffPolicy;
use crate::task::Task;
use crate::worker::Worker;
use crate::{AgentError, AgentStatus, Result};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Thread-safe registry of agent types and worker instances
pub struct AgentRegistry {
    config: RegistryConfig,
    backoff: BackoffPolicy,
    types: RwLock<HashMap<String, Box<dyn AgentFactory>>>,
    instances: DashMap<String, Arc<Worker>>,
    monitors: Mutex<Vec<JoinHandle<()>>>,
}

impl AgentRegistry {
    /// Create a registry with the given configuration
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            backoff: BackoffPolicy::default(),
            types: RwLock::new(HashMap::new()),
            instances: DashMap::new(),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Create a registry with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RegistryConfig::default())
    }

    /// Override the retry backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// The registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Bind an agent type name to a factory
    pub fn register_type(
        &self,
        type_name: impl Into<String>,
        factory: impl AgentFactory + 'static,
    ) -> Result<()> {
        let type_name = type_name.into();
        let mut types = self.types.write();

        if types.contains_key(&type_name) {
            return Err(AgentError::DuplicateType(type_name));
        }

        debug!(agent_type = %type_name, "Registered agent type");
        types.insert(type_name, Box::new(factory));
        Ok(())
    }

    /// Instantiate a worker of a registered type under a unique name
    pub fn create(
        &self,
        type_name: &str,
        instance_name: impl Into<String>,
        config: AgentConfig,
    ) -> Result<()> {
        let instance_name = instance_name.into();

        if self.instances.contains_key(&instance_name) {
            return Err(AgentError::DuplicateInstance(instance_name));
        }

        let agent = {
            let types = self.types.read();
            let factory = types
                .get(type_name)
                .ok_or_else(|| AgentError::UnknownType(type_name.to_string()))?;
            factory.build(&config)?
        };

        let worker = Worker::new(instance_name.clone(), agent, config.queue_capacity);
        info!(agent_type = %type_name, instance = %instance_name, "Created worker instance");
        self.instances.insert(instance_name, Arc::new(worker));
        Ok(())
    }

    /// Start a worker's queue consumer
    pub fn start(&self, instance_name: &str) -> Result<()> {
        let worker = self.get(instance_name)?;
        worker.start();
        Ok(())
    }

    /// Stop a worker gracefully; safe to call twice
    pub async fn stop(&self, instance_name: &str) -> Result<()> {
        let worker = self.get(instance_name)?;
        worker.stop().await;
        Ok(())
    }

    /// Dispatch a task bounded by the registry's default timeout
    pub async fn execute(&self, instance_name: &str, task: Task) -> Result<Value> {
        self.execute_with_timeout(instance_name, task, self.config.task_timeout())
            .await
    }

    /// Dispatch a task bounded by an explicit timeout
    ///
    /// Metrics are always updated: a success, failure or timeout sample is
    /// recorded with the observed latency.
    pub async fn execute_with_timeout(
        &self,
        instance_name: &str,
        task: Task,
        timeout: Duration,
    ) -> Result<Value> {
        let worker = self.get(instance_name)?;
        let task_id = task.id;
        let start = Instant::now();

        match tokio::time::timeout(timeout, worker.dispatch(task)).await {
            Ok(Ok(value)) => {
                worker.metrics.record_success(start.elapsed());
                Ok(value)
            }
            Ok(Err(e)) => {
                worker.metrics.record_failure(start.elapsed());
                Err(e)
            }
            Err(_) => {
                worker.metrics.record_timeout(start.elapsed());
                Err(AgentError::Timeout {
                    agent: instance_name.to_string(),
                    task_id,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Dispatch a task, retrying failures with exponential backoff
    ///
    /// The delay after attempt `n` is `2^n` seconds under the default
    /// policy. The last failure is re-raised once the budget is exhausted.
    pub async fn execute_with_retry(
        &self,
        instance_name: &str,
        task: Task,
        max_retries: u32,
    ) -> Result<Value> {
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match self.execute(instance_name, task.clone()).await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            instance = instance_name,
                            task_id = %task.id,
                            attempt = attempt,
                            "Task succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    warn!(
                        instance = instance_name,
                        task_id = %task.id,
                        attempt = attempt,
                        max_retries = max_retries,
                        error = %e,
                        "Task attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < max_retries {
                        tokio::time::sleep(self.backoff.delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AgentError::TaskFailed(format!(
                "task on '{}' failed after {} retries",
                instance_name, max_retries
            ))
        }))
    }

    /// Current lifecycle status of a worker
    pub fn status(&self, instance_name: &str) -> Result<AgentStatus> {
        Ok(self.get(instance_name)?.status())
    }

    /// Current health snapshot of a worker
    pub fn health(&self, instance_name: &str) -> Result<HealthSnapshot> {
        Ok(self.get(instance_name)?.health.snapshot())
    }

    /// Rolling metrics snapshot of a worker
    pub fn metrics(&self, instance_name: &str) -> Result<WorkerMetricsSnapshot> {
        let worker = self.get(instance_name)?;
        Ok(worker.metrics.snapshot(self.config.metrics_window()))
    }

    /// Registry-wide metrics across all workers
    pub fn aggregate_metrics(&self) -> AggregateMetrics {
        let window = self.config.metrics_window();
        let snapshots: Vec<_> = self
            .instances
            .iter()
            .map(|entry| entry.value().metrics.snapshot(window))
            .collect();
        AggregateMetrics::from_snapshots(&snapshots)
    }

    /// Names of all worker instances
    pub fn list_instances(&self) -> Vec<String> {
        self.instances
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Names of all registered agent types
    pub fn list_types(&self) -> Vec<String> {
        self.types.read().keys().cloned().collect()
    }

    /// Spawn the health and metrics background loops; idempotent
    pub fn spawn_monitors(self: &Arc<Self>) {
        let mut monitors = self.monitors.lock();
        if !monitors.is_empty() {
            return;
        }

        let registry = Arc::clone(self);
        monitors.push(tokio::spawn(async move { registry.health_loop().await }));

        let registry = Arc::clone(self);
        monitors.push(tokio::spawn(async move { registry.metrics_loop().await }));
    }

    /// Stop the background loops and all workers
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.monitors.lock().drain(..).collect();
        for handle in handles {
            handle.abort();
        }

        let workers: Vec<_> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        futures::future::join_all(workers.iter().map(|worker| worker.stop())).await;
        info!("Registry shut down");
    }

    fn get(&self, instance_name: &str) -> Result<Arc<Worker>> {
        self.instances
            .get(instance_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::UnknownInstance(instance_name.to_string()))
    }

    async fn health_loop(&self) {
        let mut interval = tokio::time::interval(self.config.health_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let workers: Vec<_> = self
                .instances
                .iter()
                .map(|entry| entry.value().clone())
                .collect();

            for worker in workers {
                if !worker.is_started() {
                    continue;
                }

                if worker.probe().await {
                    worker.health.record_success();
                    continue;
                }

                warn!(worker = worker.name(), "Health probe failed");

                if worker
                    .health
                    .record_failure(self.config.health_failure_threshold)
                {
                    info!(worker = worker.name(), "Worker unhealthy, restarting");
                    worker.stop().await;
                    worker.start();
                    worker.health.record_restart();
                }
            }
        }
    }

    async fn metrics_loop(&self) {
        let mut interval = tokio::time::interval(self.config.metrics_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let window = self.config.metrics_window();

        loop {
            interval.tick().await;
            for entry in self.instances.iter() {
                entry.value().metrics.prune(window);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::capability::CapabilitySet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ScriptedAgent {
        caps: CapabilitySet,
        fail_first: usize,
        calls: Arc<AtomicUsize>,
        healthy: Arc<AtomicBool>,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn capabilities(&self) -> &CapabilitySet {
            &self.caps
        }

        async fn handle(&self, task: &Task) -> Result<Value> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(AgentError::TaskFailed(format!("scripted failure {}", call)))
            } else {
                Ok(json!({ "task_type": task.task_type, "call": call }))
            }
        }

        async fn health_check(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    struct Fixture {
        calls: Arc<AtomicUsize>,
        healthy: Arc<AtomicBool>,
    }

    fn register_scripted(
        registry: &AgentRegistry,
        fail_first: usize,
        delay: Duration,
    ) -> Fixture {
        let calls = Arc::new(AtomicUsize::new(0));
        let healthy = Arc::new(AtomicBool::new(true));
        let fixture = Fixture {
            calls: calls.clone(),
            healthy: healthy.clone(),
        };

        registry
            .register_type("scripted", move |_config: &AgentConfig| -> Result<Box<dyn Agent>> {
                Ok(Box::new(ScriptedAgent {
                    caps: CapabilitySet::from_types(["classify"]),
                    fail_first,
                    calls: calls.clone(),
                    healthy: healthy.clone(),
                    delay,
                }))
            })
            .unwrap();

        fixture
    }

    #[tokio::test]
    async fn test_register_create_execute() {
        let registry = AgentRegistry::with_defaults();
        register_scripted(&registry, 0, Duration::ZERO);

        registry.create("scripted", "worker-1", AgentConfig::new()).unwrap();
        registry.start("worker-1").unwrap();

        let result = registry.execute("worker-1", Task::new("classify")).await.unwrap();
        assert_eq!(result["task_type"], json!("classify"));

        let metrics = registry.metrics("worker-1").unwrap();
        assert_eq!(metrics.success_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_type_rejected() {
        let registry = AgentRegistry::with_defaults();
        register_scripted(&registry, 0, Duration::ZERO);

        let err = registry
            .register_type("scripted", |_: &AgentConfig| -> Result<Box<dyn Agent>> {
                unreachable!("factory never called")
            })
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateType(_)));
    }

    #[tokio::test]
    async fn test_unknown_type_and_duplicate_instance() {
        let registry = AgentRegistry::with_defaults();
        register_scripted(&registry, 0, Duration::ZERO);

        let err = registry
            .create("missing", "worker-1", AgentConfig::new())
            .unwrap_err();
        assert!(matches!(err, AgentError::UnknownType(_)));

        registry.create("scripted", "worker-1", AgentConfig::new()).unwrap();
        let err = registry
            .create("scripted", "worker-1", AgentConfig::new())
            .unwrap_err();
        assert!(matches!(err, AgentError::DuplicateInstance(_)));
    }

    #[tokio::test]
    async fn test_execute_unknown_instance() {
        let registry = AgentRegistry::with_defaults();
        let err = registry.execute("ghost", Task::new("classify")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnknownInstance(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout_records_metric() {
        let registry = AgentRegistry::with_defaults();
        register_scripted(&registry, 0, Duration::from_secs(60));

        registry.create("scripted", "slow-1", AgentConfig::new()).unwrap();
        registry.start("slow-1").unwrap();

        let err = registry
            .execute_with_timeout("slow-1", Task::new("classify"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout { .. }));

        let metrics = registry.metrics("slow-1").unwrap();
        assert_eq!(metrics.timeout_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_exhausts_and_reraises() {
        let registry = AgentRegistry::with_defaults();
        let fixture = register_scripted(&registry, usize::MAX, Duration::ZERO);

        registry.create("scripted", "flaky-1", AgentConfig::new()).unwrap();
        registry.start("flaky-1").unwrap();

        let before = tokio::time::Instant::now();
        let err = registry
            .execute_with_retry("flaky-1", Task::new("classify"), 2)
            .await
            .unwrap_err();
        let elapsed = before.elapsed();

        assert!(matches!(err, AgentError::TaskFailed(_)));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 3);
        // Backoff after attempts 0 and 1: 2^0 + 2^1 = 3 seconds.
        assert!(elapsed >= Duration::from_secs(3), "elapsed was {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_recovers() {
        let registry = AgentRegistry::with_defaults();
        let fixture = register_scripted(&registry, 2, Duration::ZERO);

        registry.create("scripted", "flaky-2", AgentConfig::new()).unwrap();
        registry.start("flaky-2").unwrap();

        let result = registry
            .execute_with_retry("flaky-2", Task::new("classify"), 3)
            .await
            .unwrap();
        assert_eq!(result["call"], json!(2));
        assert_eq!(fixture.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unhealthy_worker_restarted_once() {
        let mut config = RegistryConfig::default();
        config.health_interval_ms = 50;
        let registry = Arc::new(AgentRegistry::new(config));
        let fixture = register_scripted(&registry, 0, Duration::ZERO);

        registry.create("scripted", "sick-1", AgentConfig::new()).unwrap();
        registry.start("sick-1").unwrap();
        registry.spawn_monitors();

        fixture.healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let health = registry.health("sick-1").unwrap();
        assert_eq!(health.restarts, 1, "three strikes trigger exactly one restart");

        fixture.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let health = registry.health("sick-1").unwrap();
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.state, crate::HealthState::Healthy);
        assert_eq!(health.restarts, 1);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_probe_failure_degrades_only() {
        let mut config = RegistryConfig::default();
        config.health_interval_ms = 50;
        let registry = Arc::new(AgentRegistry::new(config));
        let fixture = register_scripted(&registry, 0, Duration::ZERO);

        registry.create("scripted", "wobbly-1", AgentConfig::new()).unwrap();
        registry.start("wobbly-1").unwrap();
        registry.spawn_monitors();

        fixture.healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;
        fixture.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(60)).await;

        let health = registry.health("wobbly-1").unwrap();
        assert_eq!(health.restarts, 0);
        assert_eq!(health.state, crate::HealthState::Healthy);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_workers() {
        let registry = Arc::new(AgentRegistry::with_defaults());
        register_scripted(&registry, 0, Duration::ZERO);

        registry.create("scripted", "worker-1", AgentConfig::new()).unwrap();
        registry.start("worker-1").unwrap();
        registry.spawn_monitors();
        registry.shutdown().await;

        assert_eq!(registry.status("worker-1").unwrap(), AgentStatus::Stopped);
        let err = registry.execute("worker-1", Task::new("classify")).await.unwrap_err();
        assert!(matches!(err, AgentError::NotRunning(_)));
    }
}
