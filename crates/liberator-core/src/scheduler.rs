//! Deferred background work
//!
//! The pipeline hands delayed, fire-and-forget work (the post-deploy secret
//! sweep) to a [`TaskScheduler`] instead of spawning it directly, so the
//! same orchestrator runs on a Tokio runtime, in a test that drives tasks by
//! hand, or under any other executor that implements the trait.

use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, warn};

/// A unit of deferred work. It must handle and log its own failures.
pub type Task = BoxFuture<'static, ()>;

pub trait TaskScheduler: Send + Sync {
    /// Run `task` after `delay`. Must not block the caller.
    fn schedule(&self, name: &str, delay: Duration, task: Task);
}

/// Spawns tasks on the current Tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, name: &str, delay: Duration, task: Task) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                warn!(task = %name, error = %err, "No runtime; dropping scheduled task");
                return;
            }
        };
        let name = name.to_string();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(task = %name, "Running scheduled task");
            task.await;
        });
    }
}

struct Pending {
    name: String,
    delay: Duration,
    task: Task,
}

/// Queues tasks until [`ManualScheduler::run_all`] is awaited. Delays are
/// recorded but not waited on.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<Pending>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(name, delay)` of every queued task.
    pub fn pending(&self) -> Vec<(String, Duration)> {
        self.lock()
            .iter()
            .map(|p| (p.name.clone(), p.delay))
            .collect()
    }

    /// Run queued tasks in submission order; returns how many ran.
    pub async fn run_all(&self) -> usize {
        let tasks: Vec<Pending> = std::mem::take(&mut *self.lock());
        let count = tasks.len();
        for pending in tasks {
            debug!(task = %pending.name, "Running queued task");
            pending.task.await;
        }
        count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Pending>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskScheduler for ManualScheduler {
    fn schedule(&self, name: &str, delay: Duration, task: Task) {
        self.lock().push(Pending {
            name: name.to_string(),
            delay,
            task,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_manual_scheduler_runs_in_order() {
        let scheduler = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            scheduler.schedule(
                &format!("task-{}", i),
                Duration::from_secs(60),
                async move { order.lock().unwrap().push(i) }.boxed(),
            );
        }
        assert_eq!(scheduler.pending().len(), 3);
        assert_eq!(scheduler.pending()[0].1, Duration::from_secs(60));
        assert_eq!(scheduler.run_all().await, 3);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_waits_for_delay() {
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        TokioScheduler.schedule(
            "sweep",
            Duration::from_secs(60),
            async move {
                flag.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tokio_scheduler_without_runtime_drops_task() {
        TokioScheduler.schedule("orphan", Duration::ZERO, async {}.boxed());
    }
}
