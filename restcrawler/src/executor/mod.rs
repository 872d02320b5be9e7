//! HTTP executors.
//!
//! This module provides:
//! - The [`HttpExecutor`] seam dispatchers issue requests through
//! - [`BackoffExecutor`], the default retrying executor
//! - [`ReqwestExecutor`], a single-attempt executor
//! - [`BackoffPolicy`] and the shared client configuration

mod backoff;
mod plain;
mod retrying;

pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use plain::ReqwestExecutor;
pub use retrying::BackoffExecutor;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::call::{CallRequest, CallResponse};
use crate::errors::{CrawlerError, Result};

/// Issues a request and returns the buffered response.
///
/// Implementations are shared by every worker of a dispatcher and must not
/// keep per-request mutable state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Executes `request`. Non-retryable error statuses are returned as
    /// responses; only transport failures and exhausted retries are errors.
    async fn execute(&self, request: &CallRequest) -> Result<CallResponse>;
}

/// Configuration shared by the bundled executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-attempt request timeout in milliseconds.
    pub timeout_ms: u64,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Retry policy used by [`BackoffExecutor`].
    pub backoff: BackoffPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: format!("restcrawler/{}", env!("CARGO_PKG_VERSION")),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ExecutorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// The request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Builds the underlying `reqwest` client.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        if self.timeout_ms == 0 {
            return Err(CrawlerError::configuration("timeout_ms must be positive"));
        }
        reqwest::Client::builder()
            .timeout(self.timeout())
            .user_agent(&self.user_agent)
            .build()
            .map_err(|e| CrawlerError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

pub(crate) async fn send_once(
    client: &reqwest::Client,
    request: &CallRequest,
    timeout: Option<Duration>,
) -> Result<CallResponse> {
    let response = request
        .to_reqwest(client)
        .send()
        .await
        .map_err(|e| CrawlerError::from_reqwest(&e, timeout))?;
    CallResponse::read(response)
        .await
        .map_err(|e| CrawlerError::from_reqwest(&e, timeout))
}
