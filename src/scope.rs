use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

/// Background tasks that live no longer than their owner.
///
/// A task spawned here is dropped at its next await point once the scope is
/// cancelled, so it never writes to state after the owner has shut down.
/// Dropping the scope cancels it.
#[derive(Debug, Default)]
pub struct TaskScope {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `future` until it completes or the scope is cancelled.
    /// The handle yields `None` for cancelled tasks.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                output = future => Some(output),
            }
        })
    }

    /// Cancels every task and waits for them to wind down.
    pub async fn shutdown(&self) {
        debug!(tasks = self.tracker.len(), "Shutting down task scope");
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_spawned_task_completes() {
        let scope = TaskScope::new();
        let handle = scope.spawn(async { 7 });
        assert_eq!(handle.await.unwrap(), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_work() {
        let scope = TaskScope::new();
        let wrote = Arc::new(AtomicBool::new(false));
        let flag = wrote.clone();
        let handle = scope.spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
        });

        scope.shutdown().await;
        assert_eq!(handle.await.unwrap(), None);
        assert!(!wrote.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_spawn_after_shutdown_is_cancelled_immediately() {
        let scope = TaskScope::new();
        scope.shutdown().await;
        let handle = scope.spawn(async { 1 });
        assert_eq!(handle.await.unwrap(), None);
    }
}
