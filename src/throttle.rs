//! Admission gate shared by every call to the fulfillment service.
//!
//! A task is admitted once a concurrency permit is free and at least `min_time`
//! has passed since the previous admission. Waiters queue in FIFO order; the
//! order in which admitted tasks finish is not constrained.

use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub max_concurrent: usize,
    pub min_time: Duration,
    pub call_timeout: Option<Duration>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            min_time: Duration::from_millis(500),
            call_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl ThrottleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_concurrent = std::env::var("MFN_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.max_concurrent);
        let min_time = std::env::var("MFN_MIN_TIME_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.min_time);
        let call_timeout = match std::env::var("MFN_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.call_timeout,
        };
        Self {
            max_concurrent,
            min_time,
            call_timeout,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("call exceeded {0:?}")]
    TimedOut(Duration),
    #[error("throttle closed")]
    Closed,
}

#[derive(Clone)]
pub struct Throttle {
    inner: Arc<ThrottleInner>,
}

struct ThrottleInner {
    config: ThrottleConfig,
    permits: Arc<Semaphore>,
    // Held across the whole admission step so waiters are served in arrival order.
    last_start: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            inner: Arc::new(ThrottleInner {
                config: ThrottleConfig {
                    max_concurrent,
                    ..config
                },
                permits: Arc::new(Semaphore::new(max_concurrent)),
                last_start: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> ThrottleConfig {
        self.inner.config
    }

    /// Run `task` once admitted. The permit is held until the task finishes or
    /// its per-call timeout fires.
    pub async fn schedule<F>(&self, task: F) -> Result<F::Output, ThrottleError>
    where
        F: Future,
    {
        let permit = {
            let mut last_start = self.inner.last_start.lock().await;
            let permit = self
                .inner
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ThrottleError::Closed)?;
            if let Some(previous) = *last_start {
                sleep_until(previous + self.inner.config.min_time).await;
            }
            *last_start = Some(Instant::now());
            permit
        };
        trace!(
            target = "mfn.throttle",
            available = self.inner.permits.available_permits(),
            "task_admitted"
        );

        let output = match self.inner.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| ThrottleError::TimedOut(limit)),
            None => Ok(task.await),
        };
        drop(permit);
        output
    }

    /// Spawn `task` onto the runtime behind the gate and hand back its handle.
    pub fn submit<F>(&self, task: F) -> JoinHandle<Result<F::Output, ThrottleError>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let throttle = self.clone();
        tokio::spawn(async move { throttle.schedule(task).await })
    }
}
