//! Error types for the restcrawler pipeline.
//!
//! Errors are split by the party that observes them: [`CallError`] is what a
//! call implementation reports back to its dispatcher, [`QueueError`] covers
//! misuse of the queue closing contract, and [`CrawlerError`] is what stages
//! and executors surface to the orchestrator.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = CrawlerError> = std::result::Result<T, E>;

/// The main error type for restcrawler operations.
#[derive(Debug, Error)]
pub enum CrawlerError {
    /// A request could not be sent because of a transport-level failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure reported by the HTTP client.
        message: String,
        /// Whether retrying the same request may succeed.
        retryable: bool,
    },

    /// The executor gave up after reaching its attempt ceiling.
    #[error("giving up after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure (status or transport message).
        last: String,
    },

    /// A call reported a condition that must reach the orchestrator.
    #[error("fatal error in stage '{stage}': {message}")]
    Fatal {
        /// The stage that observed the condition.
        stage: String,
        /// Description of the condition.
        message: String,
    },

    /// A stage saw more failed calls than its configured budget allows.
    #[error("stage '{stage}' exceeded its error budget ({failures} failed calls, budget {budget})")]
    ErrorBudgetExceeded {
        /// The stage name.
        stage: String,
        /// The configured budget.
        budget: usize,
        /// Number of failed calls when the budget tripped.
        failures: usize,
    },

    /// A stage task panicked or was aborted outside of call isolation.
    #[error("stage '{stage}' terminated abnormally: {message}")]
    StagePanic {
        /// The stage name.
        stage: String,
        /// Panic or join error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A queue contract violation.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl CrawlerError {
    /// Creates a transport error that may be retried.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a transport error that must not be retried.
    pub fn permanent_transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns true if the executor may retry after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Returns true for errors that should stop the whole pipeline.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::StagePanic { .. })
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Option<Duration>) -> Self {
        if err.is_builder() || err.is_redirect() {
            return Self::permanent_transport(err.to_string());
        }
        if err.is_timeout() {
            let message = timeout.map_or_else(
                || format!("request timed out: {err}"),
                |t| format!("request timed out after {}ms: {err}", t.as_millis()),
            );
            return Self::transport(message);
        }
        if err.is_connect() {
            return Self::transport(format!("connection failed: {err}"));
        }
        Self::transport(err.to_string())
    }
}

/// Errors raised by the queue closing discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A send was attempted after the producer closed the queue.
    #[error("send on closed queue")]
    Closed,

    /// The queue was closed a second time.
    #[error("queue already closed")]
    AlreadyClosed,

    /// The consuming side was dropped while the producer was still sending.
    #[error("queue receiver dropped")]
    Disconnected,
}

/// Errors reported by [`Call`](crate::call::Call) implementations.
#[derive(Debug, Error)]
pub enum CallError {
    /// The request URL could not be parsed.
    #[error("invalid url '{url}': {message}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Parser message.
        message: String,
    },

    /// A header name or value was rejected.
    #[error("invalid header '{name}'")]
    InvalidHeader {
        /// The header name.
        name: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Body(#[from] serde_json::Error),

    /// Emitting a follow-up call failed.
    #[error("failed to emit call: {0}")]
    Emit(#[from] QueueError),

    /// A handler-defined failure.
    #[error("{0}")]
    Handler(String),

    /// A condition that must be escalated to the orchestrator.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl CallError {
    /// Creates a handler-defined failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Creates a fatal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Returns true if this failure must be escalated.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_retryability() {
        assert!(CrawlerError::transport("reset").is_retryable());
        assert!(!CrawlerError::permanent_transport("bad scheme").is_retryable());
        assert!(!CrawlerError::configuration("workers").is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        let fatal = CrawlerError::Fatal {
            stage: "search".to_string(),
            message: "401".to_string(),
        };
        assert!(fatal.is_fatal());
        assert!(!CrawlerError::transport("x").is_fatal());
        assert!(CallError::fatal("auth").is_fatal());
        assert!(!CallError::handler("missing field").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = CrawlerError::RetriesExhausted {
            attempts: 4,
            last: "status 503 Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "giving up after 4 attempt(s): status 503 Service Unavailable"
        );
        assert_eq!(QueueError::AlreadyClosed.to_string(), "queue already closed");
        let wrapped: CrawlerError = QueueError::Closed.into();
        assert_eq!(wrapped.to_string(), "send on closed queue");
    }
}
