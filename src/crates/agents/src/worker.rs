//! Worker instance handle
//!
//! A worker wraps one agent behind a bounded task queue. The queue consumer
//! is a dedicated tokio task and is the only serialization point for tasks
//! aimed at that worker: tasks execute one at a time, in arrival order.

use crate::agent::Agent;
use crate::health::HealthTracker;
use crate::metrics::WorkerMetrics;
use crate::task::Task;
use crate::{AgentError, AgentStatus, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type QueueItem = (Task, oneshot::Sender<Result<Value>>);

struct Started {
    tx: mpsc::Sender<QueueItem>,
    consumer: JoinHandle<()>,
}

/// A named worker instance owned by the registry
pub(crate) struct Worker {
    name: String,
    agent: Arc<dyn Agent>,
    status: Arc<Mutex<AgentStatus>>,
    queue_capacity: usize,
    started: Mutex<Option<Started>>,
    pub(crate) metrics: WorkerMetrics,
    pub(crate) health: HealthTracker,
}

impl Worker {
    pub(crate) fn new(name: impl Into<String>, agent: Box<dyn Agent>, queue_capacity: usize) -> Self {
        Self {
            name: name.into(),
            agent: Arc::from(agent),
            status: Arc::new(Mutex::new(AgentStatus::Idle)),
            queue_capacity,
            started: Mutex::new(None),
            metrics: WorkerMetrics::new(),
            health: HealthTracker::new(),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn status(&self) -> AgentStatus {
        *self.status.lock()
    }

    pub(crate) fn set_status(&self, status: AgentStatus) {
        *self.status.lock() = status;
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.lock().is_some()
    }

    /// Spawn the queue consumer; idempotent if already started
    pub(crate) fn start(&self) {
        let mut started = self.started.lock();
        if started.is_some() {
            debug!(worker = %self.name, "Worker already started");
            return;
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        *self.status.lock() = AgentStatus::Idle;

        let consumer = tokio::spawn(consume_loop(
            self.name.clone(),
            self.agent.clone(),
            self.status.clone(),
            rx,
        ));

        *started = Some(Started { tx, consumer });
        debug!(worker = %self.name, "Worker started");
    }

    /// Stop the worker gracefully
    ///
    /// Closes the queue so no new tasks are accepted, then waits for the
    /// consumer to finish whatever is already enqueued. Safe to call twice.
    pub(crate) async fn stop(&self) {
        let taken = self.started.lock().take();

        if let Some(Started { tx, consumer }) = taken {
            drop(tx);
            if consumer.await.is_err() {
                warn!(worker = %self.name, "Worker consumer task aborted during stop");
            }
            debug!(worker = %self.name, "Worker stopped");
        }

        *self.status.lock() = AgentStatus::Stopped;
    }

    /// Enqueue a task and await its result
    ///
    /// The capability set is checked before enqueuing so unsupported task
    /// types never occupy a queue slot.
    pub(crate) async fn dispatch(&self, task: Task) -> Result<Value> {
        if !self.agent.capabilities().supports(&task.task_type) {
            return Err(AgentError::UnsupportedTaskType {
                agent: self.name.clone(),
                task_type: task.task_type,
            });
        }

        let tx = self
            .started
            .lock()
            .as_ref()
            .map(|s| s.tx.clone())
            .ok_or_else(|| AgentError::NotRunning(self.name.clone()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send((task, reply_tx))
            .await
            .map_err(|_| AgentError::QueueClosed(self.name.clone()))?;
        drop(tx);

        reply_rx
            .await
            .map_err(|_| AgentError::QueueClosed(self.name.clone()))?
    }

    /// Run the agent's health probe
    pub(crate) async fn probe(&self) -> bool {
        self.agent.health_check().await
    }
}

async fn consume_loop(
    name: String,
    agent: Arc<dyn Agent>,
    status: Arc<Mutex<AgentStatus>>,
    mut rx: mpsc::Receiver<QueueItem>,
) {
    while let Some((mut task, reply)) = rx.recv().await {
        *status.lock() = AgentStatus::Running;
        task.mark_started();
        debug!(worker = %name, task_id = %task.id, task_type = %task.task_type, "Processing task");

        let result = agent.handle(&task).await;
        match &result {
            Ok(value) => task.mark_completed(value.clone()),
            Err(e) => task.mark_failed(e.to_string()),
        }

        *status.lock() = AgentStatus::Idle;

        // The caller may have timed out and dropped its receiver.
        if reply.send(result).is_err() {
            debug!(worker = %name, task_id = %task.id, "Reply receiver dropped");
        }
    }

    debug!(worker = %name, "Queue drained, consumer exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySet;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowEcho {
        caps: CapabilitySet,
        handled: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for SlowEcho {
        fn capabilities(&self) -> &CapabilitySet {
            &self.caps
        }

        async fn handle(&self, task: &Task) -> Result<Value> {
            tokio::time::sleep(self.delay).await;
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "echoed": task.task_type }))
        }
    }

    fn make_worker(handled: Arc<AtomicUsize>, delay: Duration) -> Worker {
        Worker::new(
            "echo-1",
            Box::new(SlowEcho {
                caps: CapabilitySet::from_types(["echo"]),
                handled,
                delay,
            }),
            8,
        )
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let handled = Arc::new(AtomicUsize::new(0));
        let worker = make_worker(handled.clone(), Duration::ZERO);
        worker.start();

        let result = worker.dispatch(Task::new("echo")).await.unwrap();
        assert_eq!(result, json!({ "echoed": "echo" }));
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unsupported_type() {
        let worker = make_worker(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        worker.start();

        let err = worker.dispatch(Task::new("translate")).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedTaskType { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_before_start() {
        let worker = make_worker(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        let err = worker.dispatch(Task::new("echo")).await.unwrap_err();
        assert!(matches!(err, AgentError::NotRunning(_)));
    }

    #[tokio::test]
    async fn test_stop_drains_in_flight_task() {
        let handled = Arc::new(AtomicUsize::new(0));
        let worker = Arc::new(make_worker(handled.clone(), Duration::from_millis(50)));
        worker.start();

        let dispatcher = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.dispatch(Task::new("echo")).await })
        };

        // Let the task reach the consumer before stopping.
        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.stop().await;

        assert_eq!(handled.load(Ordering::SeqCst), 1, "in-flight task must finish");
        assert!(dispatcher.await.unwrap().is_ok());
        assert_eq!(worker.status(), AgentStatus::Stopped);
    }

    #[tokio::test]
    async fn test_double_stop_is_safe() {
        let worker = make_worker(Arc::new(AtomicUsize::new(0)), Duration::ZERO);
        worker.start();
        worker.stop().await;
        worker.stop().await;
        assert_eq!(worker.status(), AgentStatus::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let handled = Arc::new(AtomicUsize::new(0));
        let worker = make_worker(handled.clone(), Duration::ZERO);
        worker.start();
        worker.stop().await;
        worker.start();

        worker.dispatch(Task::new("echo")).await.unwrap();
        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }
}
