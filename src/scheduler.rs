use rand::{Rng, thread_rng};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Jittered scheduling parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Nominal period between executions.
    pub period_ms: u64,
    /// Jitter amplitude: each delay is uniform in `[period - v, period + v]`.
    pub variance_ms: u64,
    /// Worker pool capacity shared by every loop started on the instance.
    pub workers: usize,
    /// Wait for a tick to complete before scheduling the next one. Off by
    /// default: the next delay starts as soon as the tick is handed to the
    /// pool, so a slow tick may overlap its successor.
    #[serde(default)]
    pub serialize_ticks: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period_ms: 3000,
            variance_ms: 1500,
            workers: 8,
            serialize_ticks: false,
        }
    }
}

/// Repeats a task forever at a randomized interval over a bounded worker
/// pool.
///
/// Every execution reports through exactly one of the two callbacks and the
/// next execution is always scheduled with a fresh random delay; the loop is
/// self-healing and never stops on task failure. Only [`stop`] ends it:
/// future schedulings are suppressed, the pool is closed, and an execution
/// already in flight finishes without rescheduling into the closed pool.
///
/// One instance is meant to be shared: all loops started on it compete for
/// the same worker permits, bounding total concurrent work regardless of how
/// many loops run.
///
/// [`stop`]: JitterScheduler::stop
pub struct JitterScheduler {
    cfg: SchedulerConfig,
    workers: Arc<Semaphore>,
    running: Arc<AtomicBool>,
}

impl JitterScheduler {
    pub fn new(cfg: SchedulerConfig) -> Self {
        let workers = Arc::new(Semaphore::new(cfg.workers.max(1)));
        Self {
            cfg,
            workers,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Starts one scheduling loop. The first execution happens after one
    /// jittered delay, not immediately.
    pub fn start<T, F, Fut, S, E>(&self, task: F, on_success: S, on_error: E) -> JoinHandle<()>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        S: Fn(T) + Send + Sync + 'static,
        E: Fn(anyhow::Error) + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let on_success = Arc::new(on_success);
        let on_error = Arc::new(on_error);
        let running = self.running.clone();
        let workers = self.workers.clone();
        let period_ms = self.cfg.period_ms;
        let variance_ms = self.cfg.variance_ms;
        let serialize = self.cfg.serialize_ticks;

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(jittered_delay(period_ms, variance_ms)).await;
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                // A closed pool means stop() won the race; bail out quietly.
                let permit = match workers.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let execution = {
                    let task = task.clone();
                    let on_success = on_success.clone();
                    let on_error = on_error.clone();
                    async move {
                        match task().await {
                            Ok(value) => on_success(value),
                            Err(err) => on_error(err),
                        }
                        drop(permit);
                    }
                };
                if serialize {
                    execution.await;
                } else {
                    tokio::spawn(execution);
                }
            }
        })
    }

    /// Suppresses future schedulings and closes the worker pool. In-flight
    /// executions are not cancelled.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.workers.close();
    }
}

/// One delay sample: uniform in `[period - variance, period + variance]`,
/// clamped at zero when the variance exceeds the period.
pub(crate) fn jittered_delay(period_ms: u64, variance_ms: u64) -> Duration {
    let period = period_ms as i64;
    let variance = variance_ms as i64;
    let delay = if variance == 0 {
        period
    } else {
        thread_rng().gen_range(period - variance..=period + variance)
    };
    Duration::from_millis(delay.max(0) as u64)
}
