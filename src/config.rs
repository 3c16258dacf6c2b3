use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Top-level configuration for the lifecycle orchestrator.
///
/// Durations are in milliseconds. Share loop defaults: a 3 s nominal period
/// with half-period jitter and eight workers shared by every twin.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Nominal share period per twin.
    pub share_period_ms: u64,
    /// Jitter amplitude around the period. `None` means half the period.
    pub share_variance_ms: Option<u64>,
    /// Worker pool capacity shared by all share loops.
    pub share_workers: usize,
    /// Allow at most one in-flight tick per share loop. Off by default:
    /// a tick that outlives its period may overlap the next one.
    #[serde(default)]
    pub serialize_ticks: bool,
    /// Bound on each stage's pending-event queue.
    pub event_capacity: usize,
    /// Pacing for the unbounded creation retry.
    pub create_retry: RetryPolicy,
}

impl OrchestratorConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults. Recognized: SHARE_PERIOD_SECONDS, SHARE_WORKERS.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut cfg = Self::default();
        if let Some(secs) = env_parse::<u64>("SHARE_PERIOD_SECONDS") {
            cfg.share_period_ms = secs * 1000;
            cfg.share_variance_ms = None;
        }
        if let Some(workers) = env_parse::<usize>("SHARE_WORKERS") {
            cfg.share_workers = workers;
        }
        cfg
    }

    /// Jitter amplitude, defaulting to half the period.
    pub fn variance_ms(&self) -> u64 {
        self.share_variance_ms.unwrap_or(self.share_period_ms / 2)
    }

    /// Scheduler view of this configuration.
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            period_ms: self.share_period_ms,
            variance_ms: self.variance_ms(),
            workers: self.share_workers,
            serialize_ticks: self.serialize_ticks,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            share_period_ms: 3000,
            share_variance_ms: None,
            share_workers: 8,
            serialize_ticks: false,
            event_capacity: 1024,
            create_retry: RetryPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

/// Pacing of the infinite creation retry.
///
/// Retries never give up; this only spaces them out. Without a backoff
/// factor every attempt waits `initial_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub backoff_factor: Option<f64>,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay_ms as f64;
        let delay = match self.backoff_factor {
            Some(factor) => base * factor.powi(attempt.min(63) as i32),
            None => base,
        };
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            backoff_factor: None,
            max_delay_ms: 30_000,
        }
    }
}
