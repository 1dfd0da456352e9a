//! Background worker that flushes idle batches.
//!
//! A deadline can only be *observed*; nothing fires when it passes. Enqueues
//! re-check fill on every arrival, but a batch that stops receiving input
//! would sit forever without this worker sweeping the registry on a fixed
//! cadence.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::registry::Registry;
use crate::model::Model;

/// How often the worker re-checks idle deadlines. Small enough that a flush
/// lands within a fraction of any sensible idle timeout.
pub(crate) const FLUSH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A handle for managing the background flush task.
///
/// Owns the task's running flag, its `JoinHandle`, and a notifier used to
/// wake it early (currently only for shutdown). Dropping the handle shuts
/// the worker down gracefully.
pub(crate) struct FlushWorkerHandle {
    /// Flag indicating whether the background task should continue running
    running: Arc<AtomicBool>,

    /// Handle to the spawned background task, becomes `None` after shutdown
    handle: Option<JoinHandle<()>>,

    /// Notification mechanism to wake up the background task
    notifier: Arc<Notify>,
}

impl FlushWorkerHandle {
    /// Spawns the background task via `task`, which receives the running
    /// flag and the notifier and returns the `JoinHandle` it created.
    pub(crate) fn new<F>(task: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>, Arc<Notify>) -> JoinHandle<()> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        let handle = task(running.clone(), notifier.clone());

        Self {
            running,
            handle: Some(handle),
            notifier,
        }
    }

    #[allow(dead_code)]
    pub(crate) fn running(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Initiates a graceful shutdown: clears the running flag, wakes the
    /// task so it observes the flag, and detaches a task to await it.
    pub(crate) fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.notifier.notify_one();

        if let Some(handle) = self.handle.take() {
            tokio::spawn(async move {
                let _ = handle.await;
            });
        }
    }
}

impl Drop for FlushWorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The flush loop body: sweep the registry every poll interval until the
/// running flag clears.
pub(crate) async fn flush_loop<M>(
    registry: Arc<Registry<M>>,
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
) where
    M: Model + 'static,
{
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        // Either a wake-up (shutdown) or the poll tick; both fall through
        // to re-checking the flag and sweeping.
        let _ = tokio::time::timeout(FLUSH_POLL_INTERVAL, notifier.notified()).await;

        if !running.load(Ordering::SeqCst) {
            break;
        }
        registry.flush_idle().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[tokio::test]
    async fn worker_starts_running() {
        let worker = FlushWorkerHandle::new(|running, _notifier| {
            tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    time::sleep(Duration::from_millis(10)).await;
                }
            })
        });

        assert!(worker.running().load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_stops_the_task() {
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_clone = stopped.clone();

        let mut worker = FlushWorkerHandle::new(|running, notifier| {
            tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    notifier.notified().await;
                }
                stopped_clone.store(true, Ordering::SeqCst);
            })
        });

        worker.shutdown();
        time::sleep(Duration::from_millis(50)).await;

        assert!(!worker.running().load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
        assert!(worker.handle.is_none());
    }

    #[tokio::test]
    async fn drop_triggers_shutdown() {
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_clone = stopped.clone();

        {
            let _worker = FlushWorkerHandle::new(|running, notifier| {
                tokio::spawn(async move {
                    while running.load(Ordering::SeqCst) {
                        notifier.notified().await;
                    }
                    stopped_clone.store(true, Ordering::SeqCst);
                })
            });
        }

        time::sleep(Duration::from_millis(50)).await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn repeated_shutdowns_are_harmless() {
        let mut worker = FlushWorkerHandle::new(|running, _notifier| {
            tokio::spawn(async move {
                while running.load(Ordering::SeqCst) {
                    time::sleep(Duration::from_millis(10)).await;
                }
            })
        });

        worker.shutdown();
        worker.shutdown();
        assert!(!worker.running().load(Ordering::SeqCst));
    }
}
