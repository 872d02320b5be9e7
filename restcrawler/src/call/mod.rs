//! The call contract.
//!
//! A [`Call`] is one unit of outbound HTTP work: it describes the request to
//! issue and interprets the completed response, optionally emitting follow-up
//! calls for the next stage through an [`OutputSink`].

mod request;
mod response;

pub use request::CallRequest;
pub use response::CallResponse;

use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{CallError, QueueError};
use crate::queue::{QueueReceiver, QueueSender};

/// A boxed call as carried by queues.
pub type BoxedCall = Box<dyn Call>;

/// Sending side of a queue of calls.
pub type CallSender = QueueSender<BoxedCall>;

/// Receiving side of a queue of calls.
pub type CallReceiver = QueueReceiver<BoxedCall>;

/// A unit of HTTP work.
///
/// The `Debug` representation identifies the call in logs.
#[async_trait]
pub trait Call: Send + Sync + Debug {
    /// Builds the request to issue. Must not have side effects.
    fn build_request(&self) -> Result<CallRequest, CallError>;

    /// Interprets a completed response.
    ///
    /// Follow-up calls go through `sink`; emitting suspends while the
    /// downstream queue is full.
    async fn handle_response(
        &self,
        response: CallResponse,
        sink: &OutputSink,
    ) -> Result<(), CallError>;
}

/// The send-only handle a call handler uses to emit follow-up calls.
///
/// Terminal stages hand out a sink with no queue behind it; calls emitted
/// there are discarded.
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    sender: Option<CallSender>,
    emitted: Arc<AtomicUsize>,
}

impl OutputSink {
    /// Creates a sink feeding `sender`.
    #[must_use]
    pub fn new(sender: CallSender) -> Self {
        Self {
            sender: Some(sender),
            emitted: Arc::default(),
        }
    }

    /// Creates a sink for a terminal stage.
    #[must_use]
    pub fn terminal() -> Self {
        Self::default()
    }

    /// Emits a follow-up call.
    pub async fn emit<C: Call + 'static>(&self, call: C) -> Result<(), QueueError> {
        self.emit_boxed(Box::new(call)).await
    }

    /// Emits an already boxed follow-up call.
    pub async fn emit_boxed(&self, call: BoxedCall) -> Result<(), QueueError> {
        let Some(sender) = &self.sender else {
            debug!(call = ?call, "terminal stage, discarding emitted call");
            return Ok(());
        };
        sender.send(call).await?;
        self.emitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns true if emitted calls are discarded.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.sender.is_none()
    }

    /// Number of calls successfully emitted through this sink and its clones.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl From<Option<CallSender>> for OutputSink {
    fn from(sender: Option<CallSender>) -> Self {
        sender.map_or_else(Self::terminal, Self::new)
    }
}
