//! Retrying executor with jittered backoff.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{send_once, BackoffPolicy, ExecutorConfig, HttpExecutor};
use crate::call::{CallRequest, CallResponse};
use crate::errors::{CrawlerError, Result};

/// Executes requests, retrying transport failures and retryable statuses
/// according to a [`BackoffPolicy`].
///
/// Holds no per-request state: the attempt counter and the previous response
/// live on the stack of each `execute` call.
#[derive(Debug, Clone)]
pub struct BackoffExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl BackoffExecutor {
    /// Creates an executor from configuration.
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let client = config.build_client()?;
        Ok(Self { client, config })
    }

    /// Creates an executor with the default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ExecutorConfig::default())
    }

    /// Wraps an existing client with a policy.
    #[must_use]
    pub fn from_client(client: reqwest::Client, policy: BackoffPolicy) -> Self {
        Self {
            client,
            config: ExecutorConfig::default().with_backoff(policy),
        }
    }

    /// The retry policy.
    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.config.backoff
    }
}

#[async_trait]
impl HttpExecutor for BackoffExecutor {
    async fn execute(&self, request: &CallRequest) -> Result<CallResponse> {
        let policy = self.policy();
        let ceiling = policy.attempt_ceiling();
        let timeout = Some(self.config.timeout());
        let mut attempt = 0;

        loop {
            let outcome = send_once(&self.client, request, timeout).await;
            attempt += 1;

            let retryable = match &outcome {
                Ok(response) => policy.is_retryable_status(response.status()),
                Err(err) => err.is_retryable(),
            };
            if !retryable {
                return outcome;
            }

            if attempt >= ceiling {
                let last = match &outcome {
                    Ok(response) => format!("status {}", response.status()),
                    Err(err) => err.to_string(),
                };
                warn!(
                    method = %request.method(),
                    url = %request.url(),
                    attempts = attempt,
                    last = %last,
                    "giving up after exhausting retries"
                );
                return Err(CrawlerError::RetriesExhausted {
                    attempts: attempt,
                    last,
                });
            }

            let delay = policy.delay(attempt - 1, outcome.as_ref().ok());
            debug!(
                url = %request.url(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                status = outcome.as_ref().ok().map(|r| r.status().as_u16()),
                error = outcome.as_ref().err().map(tracing::field::display),
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
