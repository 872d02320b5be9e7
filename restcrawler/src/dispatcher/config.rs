//! Dispatcher configuration.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::call::CallSender;
use crate::executor::HttpExecutor;

/// Default number of concurrent workers per dispatcher.
pub const DEFAULT_WORKERS: usize = 2;

/// What a dispatcher does after a call reports a fatal condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FatalPolicy {
    /// Stop dispatching; remaining input is drained and discarded (default).
    #[default]
    StopStage,
    /// Keep dispatching the remaining input.
    Continue,
}

/// Settings applied to a [`Dispatcher`](super::Dispatcher) at construction.
///
/// Every setter overwrites the previous value of the same field, so the
/// last call wins regardless of the order settings are chained in.
#[derive(Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent workers. Must be positive.
    pub workers: usize,
    /// Executor override. `None` selects the default
    /// [`BackoffExecutor`](crate::executor::BackoffExecutor).
    pub executor: Option<Arc<dyn HttpExecutor>>,
    /// Queue receiving calls emitted by handlers. `None` marks a terminal
    /// stage.
    pub output: Option<CallSender>,
    /// Reaction to fatal call failures.
    pub fatal_policy: FatalPolicy,
    /// Maximum failed calls tolerated before the stage stops dispatching.
    pub max_errors: Option<usize>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            executor: None,
            output: None,
            fatal_policy: FatalPolicy::default(),
            max_errors: None,
        }
    }
}

impl DispatcherConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets a custom executor.
    #[must_use]
    pub fn with_executor(self, executor: impl HttpExecutor + 'static) -> Self {
        self.with_shared_executor(Arc::new(executor))
    }

    /// Sets an executor shared with other dispatchers.
    #[must_use]
    pub fn with_shared_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Chains this stage into `output`.
    #[must_use]
    pub fn with_output(mut self, output: CallSender) -> Self {
        self.output = Some(output);
        self
    }

    /// Sets the fatal policy.
    #[must_use]
    pub const fn with_fatal_policy(mut self, policy: FatalPolicy) -> Self {
        self.fatal_policy = policy;
        self
    }

    /// Sets the error budget.
    #[must_use]
    pub const fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = Some(max_errors);
        self
    }
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("workers", &self.workers)
            .field("custom_executor", &self.executor.is_some())
            .field("output", &self.output)
            .field("fatal_policy", &self.fatal_policy)
            .field("max_errors", &self.max_errors)
            .finish()
    }
}
