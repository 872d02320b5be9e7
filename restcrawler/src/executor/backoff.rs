//! Backoff policy for retrying transient HTTP failures.
//!
//! Decides whether a response or transport error is worth retrying and how
//! long to wait before the next attempt.

use rand::Rng;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::call::CallResponse;

/// Growth of the delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffStrategy {
    /// delay = min * 2^attempt + jitter
    #[default]
    ExponentialJitter,
    /// delay = (min + jitter) * (attempt + 1)
    LinearJitter,
}

/// Retry policy applied by [`BackoffExecutor`](super::BackoffExecutor).
///
/// Every decision is a pure function of the attempt number and the previous
/// response, so one policy can be shared by any number of concurrent requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Lower delay bound in milliseconds.
    pub min_delay_ms: u64,
    /// Upper delay bound in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum attempts, including the first one.
    pub max_attempts: u32,
    /// Delay growth strategy.
    pub strategy: BackoffStrategy,
    /// Extra statuses to retry on top of 429 and 5xx (except 501).
    pub retry_on_status: Vec<u16>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: 4,
            strategy: BackoffStrategy::ExponentialJitter,
            retry_on_status: Vec::new(),
        }
    }
}

impl BackoffPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets both delay bounds.
    #[must_use]
    pub const fn with_delay_bounds(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_delay_ms = min_ms;
        self.max_delay_ms = max_ms;
        self
    }

    /// Sets the delay growth strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Adds a retryable status.
    #[must_use]
    pub fn with_retry_on_status(mut self, status: u16) -> Self {
        self.retry_on_status.push(status);
        self
    }

    /// Lower delay bound.
    #[must_use]
    pub const fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// Upper delay bound. Never below the lower bound.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms))
    }

    /// The attempt ceiling, at least one.
    #[must_use]
    pub fn attempt_ceiling(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Returns true if a response with this status should be retried.
    #[must_use]
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
            || self.retry_on_status.contains(&status.as_u16())
    }

    /// Delay before the retry following attempt `attempt` (0-indexed).
    ///
    /// A whole-second `Retry-After` header on the previous response is
    /// honored exactly. Otherwise the strategy's formula is applied with a
    /// random jitter drawn from `[0, max - min)`.
    #[must_use]
    pub fn delay(&self, attempt: u32, previous: Option<&CallResponse>) -> Duration {
        if let Some(retry_after) = previous.and_then(CallResponse::retry_after) {
            return retry_after;
        }
        self.delay_with_jitter(attempt, self.random_jitter())
    }

    /// Deterministic form of [`delay`](Self::delay) for a given jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        // Whole nanoseconds keep the arithmetic exact below 2^53.
        let min = self.min_delay().as_nanos() as f64;
        let max = self.max_delay();
        let jitter = jitter.as_nanos() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        let nanos = match self.strategy {
            BackoffStrategy::ExponentialJitter => min.mul_add(2f64.powi(exponent), jitter),
            BackoffStrategy::LinearJitter => (min + jitter) * (f64::from(attempt) + 1.0),
        };

        if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
            return max;
        }
        Duration::from_nanos(nanos as u64)
    }

    fn random_jitter(&self) -> Duration {
        let span = self.max_delay().saturating_sub(self.min_delay());
        let span_ms = u64::try_from(span.as_millis()).unwrap_or(u64::MAX);
        if span_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..span_ms))
    }
}
