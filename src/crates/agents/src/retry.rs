//! Exponential backoff for retried task dispatch

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff policy used by `execute_with_retry` and step retries
///
/// The delay for attempt `n` (0-indexed) is `base_secs * 2^n`, capped at
/// `max_delay_secs`. Jitter is off by default so the schedule stays exactly
/// `1s, 2s, 4s, ...` with the default base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Base delay in seconds; attempt 0 waits exactly this long
    #[serde(default = "default_base_secs")]
    pub base_secs: f64,

    /// Cap on a single delay in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,

    /// Whether to multiply delays by a random factor in `[1.0, 1.25)`
    #[serde(default)]
    pub jitter: bool,
}

fn default_base_secs() -> f64 {
    1.0
}

fn default_max_delay_secs() -> f64 {
    128.0
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            max_delay_secs: default_max_delay_secs(),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Set the base delay
    pub fn with_base_secs(mut self, base_secs: f64) -> Self {
        self.base_secs = base_secs;
        self
    }

    /// Set the delay cap
    pub fn with_max_delay_secs(mut self, max_delay_secs: f64) -> Self {
        self.max_delay_secs = max_delay_secs;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the retry following the given attempt (0-indexed)
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self.base_secs * 2f64.powi(attempt as i32);
        let capped = exponential.min(self.max_delay_secs);

        let delayed = if self.jitter {
            use rand::Rng;
            let factor = rand::thread_rng().gen_range(1.0..1.25);
            capped * factor
        } else {
            capped
        };

        Duration::from_secs_f64(delayed)
    }
}
