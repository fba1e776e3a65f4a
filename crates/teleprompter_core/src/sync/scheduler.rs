//! Deferred task scheduling.
//!
//! Two behaviors are timing-based: the relay removes its entry shortly
//! after writing it, and the control view delays its first full-state
//! broadcast until peers have had time to attach. Neither is cancellable.

use std::time::Duration;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs a task once after a fixed delay.
pub trait Scheduler: Send + Sync {
    /// Run `task` after `delay`.
    fn schedule(&self, delay: Duration, task: Task);
}

/// Runs every task immediately, ignoring the delay.
///
/// Used when no timer facility is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, _delay: Duration, task: Task) {
        task();
    }
}

/// Scheduler backed by `tokio::time::sleep` on a spawned task.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler {
    handle: Option<tokio::runtime::Handle>,
}

#[cfg(feature = "tokio")]
impl TokioScheduler {
    /// Use the runtime current at construction (or at scheduling time).
    pub fn new() -> Self {
        Self {
            handle: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// Use an explicit runtime handle.
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Some(handle),
        }
    }
}

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) {
        let handle = self
            .handle
            .clone()
            .or_else(|| tokio::runtime::Handle::try_current().ok());
        match handle {
            Some(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    task();
                });
            }
            None => {
                log::warn!("[Scheduler] No tokio runtime, running deferred task immediately");
                task();
            }
        }
    }
}

/// Default scheduler for this build.
pub fn default_scheduler() -> std::sync::Arc<dyn Scheduler> {
    #[cfg(feature = "tokio")]
    {
        std::sync::Arc::new(TokioScheduler::new())
    }
    #[cfg(not(feature = "tokio"))]
    {
        std::sync::Arc::new(ImmediateScheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_immediate_scheduler_runs_now() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        ImmediateScheduler.schedule(Duration::from_secs(60), Box::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }

    #[cfg(feature = "tokio")]
    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_waits_for_delay() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        TokioScheduler::new().schedule(
            Duration::from_millis(500),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
