//! Worker health tracking
//!
//! Probe results feed a per-worker tracker. A single failed probe marks the
//! worker degraded; reaching the consecutive-failure threshold (three by
//! default) marks it unhealthy and signals the registry to restart it. A
//! successful probe resets the failure count to zero.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Health classification derived from consecutive probe failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Last probe succeeded
    Healthy,
    /// At least one recent probe failed, below the restart threshold
    Degraded,
    /// Consecutive failures reached the threshold
    Unhealthy,
}

/// Serializable view of one worker's health
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Current classification
    pub state: HealthState,
    /// Consecutive failed probes since the last success or restart
    pub consecutive_failures: u32,
    /// Autonomous restarts performed on this worker
    pub restarts: u32,
}

/// Per-worker probe bookkeeping
#[derive(Debug)]
pub(crate) struct HealthTracker {
    state: Mutex<HealthState>,
    consecutive_failures: AtomicU32,
    restarts: AtomicU32,
}

impl HealthTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(HealthState::Healthy),
            consecutive_failures: AtomicU32::new(0),
            restarts: AtomicU32::new(0),
        }
    }

    /// Record a successful probe, resetting the failure count
    pub(crate) fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.state.lock() = HealthState::Healthy;
    }

    /// Record a failed probe; returns `true` when the threshold is reached
    /// and the worker should be restarted
    pub(crate) fn record_failure(&self, threshold: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.lock();
        if failures >= threshold {
            *state = HealthState::Unhealthy;
            true
        } else {
            *state = HealthState::Degraded;
            false
        }
    }

    /// Record a completed restart; the next episode starts from zero
    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.state.lock() = HealthState::Healthy;
    }

    pub(crate) fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            state: *self.state.lock(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_failure_degrades() {
        let tracker = HealthTracker::new();
        assert!(!tracker.record_failure(3));

        let snap = tracker.snapshot();
        assert_eq!(snap.state, HealthState::Degraded);
        assert_eq!(snap.consecutive_failures, 1);
    }

    #[test]
    fn test_three_strikes_unhealthy() {
        let tracker = HealthTracker::new();
        assert!(!tracker.record_failure(3));
        assert!(!tracker.record_failure(3));
        assert!(tracker.record_failure(3));
        assert_eq!(tracker.snapshot().state, HealthState::Unhealthy);
    }

    #[test]
    fn test_success_resets_counter() {
        let tracker = HealthTracker::new();
        tracker.record_failure(3);
        tracker.record_failure(3);
        tracker.record_success();

        let snap = tracker.snapshot();
        assert_eq!(snap.state, HealthState::Healthy);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[test]
    fn test_restart_starts_new_episode() {
        let tracker = HealthTracker::new();
        for _ in 0..3 {
            tracker.record_failure(3);
        }
        tracker.record_restart();

        let snap = tracker.snapshot();
        assert_eq!(snap.restarts, 1);
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.state, HealthState::Healthy);
    }
}
