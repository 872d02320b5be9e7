//! Single-attempt executor.

use async_trait::async_trait;
use tracing::debug;

use super::{send_once, ExecutorConfig, HttpExecutor};
use crate::call::{CallRequest, CallResponse};
use crate::errors::Result;

/// Sends each request exactly once through a `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    /// Creates an executor from configuration. The backoff policy is ignored.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        Ok(Self {
            client: config.build_client()?,
        })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &CallRequest) -> Result<CallResponse> {
        let response = send_once(&self.client, request, None).await?;
        debug!(
            method = %request.method(),
            url = %request.url(),
            status = response.status().as_u16(),
            "request completed"
        );
        Ok(response)
    }
}
