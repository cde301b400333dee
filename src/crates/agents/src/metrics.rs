//! Rolling per-worker metrics
//!
//! The execute path records one sample per dispatched task; the registry's
//! metrics loop prunes samples that have aged out of the configured window.
//! Rolling success rate and average latency are computed over the retained
//! window, while the lifetime counters are monotonic.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Outcome of a single dispatched task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    outcome: Outcome,
    latency: Duration,
}

/// Per-worker metrics store
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    success: AtomicU64,
    failure: AtomicU64,
    timeout: AtomicU64,
    samples: Mutex<VecDeque<Sample>>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful dispatch
    pub fn record_success(&self, latency: Duration) {
        self.success.fetch_add(1, Ordering::Relaxed);
        self.push(Outcome::Success, latency);
    }

    /// Record a failed dispatch
    pub fn record_failure(&self, latency: Duration) {
        self.failure.fetch_add(1, Ordering::Relaxed);
        self.push(Outcome::Failure, latency);
    }

    /// Record a timed-out dispatch
    pub fn record_timeout(&self, latency: Duration) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
        self.push(Outcome::Timeout, latency);
    }

    fn push(&self, outcome: Outcome, latency: Duration) {
        self.samples.lock().push_back(Sample {
            at: Instant::now(),
            outcome,
            latency,
        });
    }

    /// Drop samples older than the window
    pub fn prune(&self, window: Duration) {
        let cutoff = Instant::now().checked_sub(window);
        let Some(cutoff) = cutoff else { return };
        let mut samples = self.samples.lock();
        while samples.front().map_or(false, |s| s.at < cutoff) {
            samples.pop_front();
        }
    }

    /// Snapshot the lifetime counters and the rolling window statistics
    pub fn snapshot(&self, window: Duration) -> WorkerMetricsSnapshot {
        self.prune(window);

        let samples = self.samples.lock();
        let windowed_total = samples.len() as u64;
        let windowed_success = samples
            .iter()
            .filter(|s| s.outcome == Outcome::Success)
            .count() as u64;

        let success_rate = if windowed_total > 0 {
            windowed_success as f64 / windowed_total as f64
        } else {
            0.0
        };

        let avg_latency_ms = if windowed_total > 0 {
            let total: Duration = samples.iter().map(|s| s.latency).sum();
            total.as_secs_f64() * 1000.0 / windowed_total as f64
        } else {
            0.0
        };

        WorkerMetricsSnapshot {
            success_count: self.success.load(Ordering::Relaxed),
            failure_count: self.failure.load(Ordering::Relaxed),
            timeout_count: self.timeout.load(Ordering::Relaxed),
            windowed_total,
            success_rate,
            avg_latency_ms,
        }
    }
}

/// Serializable snapshot of one worker's metrics
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMetricsSnapshot {
    /// Lifetime successful dispatches
    pub success_count: u64,
    /// Lifetime failed dispatches
    pub failure_count: u64,
    /// Lifetime timed-out dispatches
    pub timeout_count: u64,
    /// Samples retained in the rolling window
    pub windowed_total: u64,
    /// Success rate over the rolling window (0.0 to 1.0)
    pub success_rate: f64,
    /// Average latency over the rolling window in milliseconds
    pub avg_latency_ms: f64,
}

/// Serializable registry-wide metrics
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    /// Number of registered worker instances
    pub workers: usize,
    /// Lifetime dispatches across all workers
    pub total_tasks: u64,
    /// Success rate across all rolling windows (0.0 to 1.0)
    pub success_rate: f64,
    /// Average latency across all rolling windows in milliseconds
    pub avg_latency_ms: f64,
}

impl AggregateMetrics {
    /// Fold per-worker snapshots into a registry-wide view
    pub fn from_snapshots(snapshots: &[WorkerMetricsSnapshot]) -> Self {
        let total_tasks = snapshots
            .iter()
            .map(|s| s.success_count + s.failure_count + s.timeout_count)
            .sum();

        let windowed_total: u64 = snapshots.iter().map(|s| s.windowed_total).sum();
        let (success_rate, avg_latency_ms) = if windowed_total > 0 {
            let successes: f64 = snapshots
                .iter()
                .map(|s| s.success_rate * s.windowed_total as f64)
                .sum();
            let latency: f64 = snapshots
                .iter()
                .map(|s| s.avg_latency_ms * s.windowed_total as f64)
                .sum();
            (
                successes / windowed_total as f64,
                latency / windowed_total as f64,
            )
        } else {
            (0.0, 0.0)
        };

        Self {
            workers: snapshots.len(),
            total_tasks,
            success_rate,
            avg_latency_ms,
        }
    }
}
