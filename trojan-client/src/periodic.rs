//! Scoped periodic background work
//!
//! A [`PeriodicTask`] runs a callback on a fixed period until it is stopped or
//! dropped. The handle is the only way to reach the task, so whoever owns the
//! handle decides its lifetime.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::debug;

/// When the first tick fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstTick {
    /// Right away, then every period
    Immediate,
    /// One period from now
    AfterPeriod,
}

/// Handle to a periodic task. Aborts the task when stopped or dropped.
pub struct PeriodicTask {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn `tick` every `period` on the current tokio runtime
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, first: FirstTick, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = match first {
                FirstTick::Immediate => interval(period),
                FirstTick::AfterPeriod => interval_at(Instant::now() + period, period),
            };
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick().await;
            }
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");
        Self {
            name,
            handle: Some(handle),
        }
    }

    /// Abort the task. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!(task = self.name, "Periodic task stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(first: FirstTick) -> (PeriodicTask, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), first, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (task, count)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_first_tick() {
        let (_task, count) = counting_task(FirstTick::Immediate);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_first_tick() {
        let (_task, count) = counting_task(FirstTick::AfterPeriod);
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_final_and_idempotent() {
        let (mut task, count) = counting_task(FirstTick::Immediate);
        settle().await;
        assert!(task.is_running());

        task.stop();
        task.stop();
        assert!(!task.is_running());

        tokio::time::advance(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_task() {
        let (task, count) = counting_task(FirstTick::Immediate);
        settle().await;
        drop(task);

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
