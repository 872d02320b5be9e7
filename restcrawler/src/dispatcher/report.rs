//! Per-stage run accounting.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one dispatcher run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    /// Stage name.
    pub stage: String,
    /// Calls taken from the input queue.
    pub received: usize,
    /// Calls whose handler returned successfully.
    pub succeeded: usize,
    /// Calls whose request could not be built.
    pub build_failed: usize,
    /// Calls dropped after a transport failure or exhausted retries.
    pub transport_failed: usize,
    /// Calls whose handler failed or panicked.
    pub handler_failed: usize,
    /// Calls discarded without processing after the stage halted.
    pub discarded: usize,
    /// Follow-up calls emitted to the output queue.
    pub emitted: usize,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the output queue was closed.
    pub finished_at: DateTime<Utc>,
}

impl DispatchReport {
    /// Total failed calls.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.build_failed + self.transport_failed + self.handler_failed
    }

    /// Wall-clock run time.
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[derive(Debug, Default)]
pub(crate) struct StageCounters {
    pub received: AtomicUsize,
    pub succeeded: AtomicUsize,
    pub build_failed: AtomicUsize,
    pub transport_failed: AtomicUsize,
    pub handler_failed: AtomicUsize,
    pub discarded: AtomicUsize,
}

impl StageCounters {
    pub fn bump(counter: &AtomicUsize) -> usize {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn failed(&self) -> usize {
        self.build_failed.load(Ordering::Relaxed)
            + self.transport_failed.load(Ordering::Relaxed)
            + self.handler_failed.load(Ordering::Relaxed)
    }

    pub fn report(
        &self,
        stage: &str,
        emitted: usize,
        started_at: DateTime<Utc>,
    ) -> DispatchReport {
        DispatchReport {
            stage: stage.to_string(),
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            build_failed: self.build_failed.load(Ordering::Relaxed),
            transport_failed: self.transport_failed.load(Ordering::Relaxed),
            handler_failed: self.handler_failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            emitted,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
