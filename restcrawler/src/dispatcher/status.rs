//! Observable dispatcher lifecycle.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Lifecycle of a dispatcher. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DispatchState {
    /// Constructed, not yet running.
    Idle,
    /// Pulling calls from the input queue.
    Running,
    /// Input exhausted, units still in flight.
    Draining,
    /// All units finished and the output queue closed.
    Closed,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Cloneable handle observing a dispatcher's [`DispatchState`].
#[derive(Clone)]
pub struct StageStatus {
    tx: Arc<watch::Sender<DispatchState>>,
}

impl StageStatus {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(DispatchState::Idle);
        Self { tx: Arc::new(tx) }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> DispatchState {
        *self.tx.borrow()
    }

    /// Waits until the dispatcher reaches `state` or a later one.
    pub async fn reached(&self, state: DispatchState) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|current| *current >= state).await;
    }

    /// Waits until the dispatcher is closed.
    pub async fn closed(&self) {
        self.reached(DispatchState::Closed).await;
    }

    /// Moves forward to `next`. Returns false if already at or past it.
    pub(crate) fn advance(&self, next: DispatchState) -> bool {
        self.tx.send_if_modified(|current| {
            if *current < next {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

impl fmt::Debug for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageStatus").field(&self.state()).finish()
    }
}
