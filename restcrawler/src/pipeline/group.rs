//! Barrier over a set of named pipeline tasks.

use std::future::Future;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, Instrument};

use crate::errors::{CrawlerError, Result};

/// A group of named tasks awaited together.
///
/// Tasks start running as soon as they are spawned. [`wait`](Self::wait)
/// joins all of them and reports each outcome under the task's name; a task
/// that panics or is aborted is reported as [`CrawlerError::StagePanic`].
pub struct StageGroup<T> {
    handles: RwLock<Vec<(String, JoinHandle<Result<T>>)>>,
}

impl<T: Send + 'static> StageGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(Vec::new()),
        }
    }

    /// Spawns a task in the group, inheriting the current span.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(task.in_current_span());
        self.handles.write().push((name.into(), handle));
    }

    /// Waits for every task, returning outcomes in spawn order.
    pub async fn wait(&self) -> Vec<(String, Result<T>)> {
        let handles: Vec<_> = std::mem::take(&mut *self.handles.write());

        let mut outcomes = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            let outcome = match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    error!(task = %name, error = %join_error, "task terminated abnormally");
                    Err(CrawlerError::StagePanic {
                        stage: name.clone(),
                        message: join_error.to_string(),
                    })
                }
            };
            outcomes.push((name, outcome));
        }
        outcomes
    }

    /// Number of tasks not yet awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Returns true if no tasks are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

impl<T: Send + 'static> Default for StageGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for StageGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .handles
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        f.debug_struct("StageGroup").field("pending", &names).finish()
    }
}
