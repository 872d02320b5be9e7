//! Mock calls and executors for testing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;

use crate::call::{Call, CallRequest, CallResponse, OutputSink};
use crate::errors::{CallError, Result};
use crate::executor::HttpExecutor;

/// A GET call that counts handled responses and can fan out follow-up calls.
///
/// A `401 Unauthorized` response is reported as fatal instead of counted.
#[derive(Debug, Clone)]
pub struct RecordingCall {
    url: String,
    handled: Arc<AtomicUsize>,
    fan_out: Option<(usize, Arc<AtomicUsize>)>,
    child_url: Option<String>,
}

impl RecordingCall {
    /// Creates a call to `url` that increments `handled` on every response.
    #[must_use]
    pub fn new(url: impl Into<String>, handled: Arc<AtomicUsize>) -> Self {
        Self {
            url: url.into(),
            handled,
            fan_out: None,
            child_url: None,
        }
    }

    /// Emits `count` follow-up calls to the same URL per response, each
    /// recording into `child_handled`.
    #[must_use]
    pub fn with_fan_out(mut self, count: usize, child_handled: Arc<AtomicUsize>) -> Self {
        self.fan_out = Some((count, child_handled));
        self
    }

    /// Points follow-up calls at `url` instead of this call's URL.
    #[must_use]
    pub fn with_child_url(mut self, url: impl Into<String>) -> Self {
        self.child_url = Some(url.into());
        self
    }
}

#[async_trait]
impl Call for RecordingCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        CallRequest::get(&self.url)
    }

    async fn handle_response(
        &self,
        response: CallResponse,
        sink: &OutputSink,
    ) -> Result<(), CallError> {
        response.ensure_authorized()?;
        self.handled.fetch_add(1, Ordering::SeqCst);
        if let Some((count, child_handled)) = &self.fan_out {
            let url = self.child_url.as_ref().unwrap_or(&self.url);
            for _ in 0..*count {
                sink.emit(Self::new(url.clone(), Arc::clone(child_handled)))
                    .await?;
            }
        }
        Ok(())
    }
}

/// A call whose request can never be built.
#[derive(Debug, Clone, Default)]
pub struct UnbuildableCall;

#[async_trait]
impl Call for UnbuildableCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        CallRequest::get("::not a url::")
    }

    async fn handle_response(
        &self,
        _response: CallResponse,
        _sink: &OutputSink,
    ) -> Result<(), CallError> {
        unreachable!("request construction always fails")
    }
}

/// A call whose handler panics.
#[derive(Debug, Clone)]
pub struct PanickingCall {
    url: String,
}

impl PanickingCall {
    /// Creates a panicking call to `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Call for PanickingCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        CallRequest::get(&self.url)
    }

    async fn handle_response(
        &self,
        _response: CallResponse,
        _sink: &OutputSink,
    ) -> Result<(), CallError> {
        panic!("handler blew up");
    }
}

/// A call whose request cannot be built and whose `Debug` output panics.
#[derive(Clone, Default)]
pub struct MisbehavingCall;

impl std::fmt::Debug for MisbehavingCall {
    fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        panic!("description blew up");
    }
}

#[async_trait]
impl Call for MisbehavingCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        CallRequest::get("::not a url::")
    }

    async fn handle_response(
        &self,
        _response: CallResponse,
        _sink: &OutputSink,
    ) -> Result<(), CallError> {
        unreachable!("request construction always fails")
    }
}

/// A call that escalates `401 Unauthorized` responses as fatal.
#[derive(Debug, Clone)]
pub struct AuthenticatedCall {
    url: String,
    handled: Arc<AtomicUsize>,
}

impl AuthenticatedCall {
    /// Creates a call to `url` counting successful responses in `handled`.
    #[must_use]
    pub fn new(url: impl Into<String>, handled: Arc<AtomicUsize>) -> Self {
        Self {
            url: url.into(),
            handled,
        }
    }
}

#[async_trait]
impl Call for AuthenticatedCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        CallRequest::get(&self.url)?.with_bearer_token("test-token")
    }

    async fn handle_response(
        &self,
        response: CallResponse,
        _sink: &OutputSink,
    ) -> Result<(), CallError> {
        response.ensure_authorized()?;
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// An executor answering every request with a fixed status after a delay,
/// tracking how many requests are in flight at once.
#[derive(Debug)]
pub struct CountingExecutor {
    status: StatusCode,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl CountingExecutor {
    /// Creates an executor answering `200 OK` after `latency`.
    #[must_use]
    pub fn new(latency: Duration) -> Self {
        Self::with_status(StatusCode::OK, latency)
    }

    /// Creates an executor answering `status` after `latency`.
    #[must_use]
    pub const fn with_status(status: StatusCode, latency: Duration) -> Self {
        Self {
            status,
            latency,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// Highest number of simultaneous requests observed.
    #[must_use]
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Total requests executed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// URLs of every executed request, in completion order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }
}

#[async_trait]
impl HttpExecutor for CountingExecutor {
    async fn execute(&self, request: &CallRequest) -> Result<CallResponse> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        tokio::time::sleep(self.latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(request.url().to_string());
        Ok(CallResponse::from_status(self.status))
    }
}
