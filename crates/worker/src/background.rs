//! Detached tasks that outlive the request that started them.
//!
//! A response path spawns work here and returns without awaiting it. The
//! only effect such a task may have is on the cache store.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

/// Set of fire-and-forget tasks owned by a worker.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` without waiting for it. Finished tasks are reaped first.
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            if let Err(e) = finished {
                tracing::warn!("background task failed: {}", e);
            }
        }
        tasks.spawn(task);
    }

    /// Number of tasks not yet reaped.
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for every task spawned so far to finish.
    ///
    /// The set is swapped out first, so `spawn` never waits on a drain.
    /// Tasks spawned meanwhile are left for the next drain.
    pub async fn drain(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                tracing::warn!("background task failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for BackgroundTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTasks").finish_non_exhaustive()
    }
}
