//! Retry with exponential backoff
//!
//! The decision "retry after how long, or give up" is the pure function
//! [`next_step`]; [`RetryingClient`] only drives it.

use super::retry_formatter::{RetryContext, RetryErrorType};
use super::{FetchError, FetchRequest, FetchResponse, FetchResult, FetchSettings, PageFetcher};
use crate::downloader::config::{
    calculate_backoff, BACKOFF_FACTOR, INITIAL_BACKOFF_SECS, MAX_ATTEMPTS, MAX_BACKOFF_SECS,
    RATE_LIMIT_BACKOFF_FACTOR,
};
use crate::downloader::rate_limit::PoliteDelay;
use crate::metrics::{self, HttpRequestMetrics};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempt limit and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, first try included
    pub max_attempts: u32,
    /// Backoff before the first retry
    pub base_delay: Duration,
    /// Ceiling for any single backoff
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_secs(INITIAL_BACKOFF_SECS),
            max_delay: Duration::from_secs(MAX_BACKOFF_SECS),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry_count + 1`.
    ///
    /// Rate-limit responses back off by a factor of 3, everything else by 2.
    pub fn backoff(&self, retry_count: u32, kind: RetryErrorType) -> Duration {
        let factor = match kind {
            RetryErrorType::RateLimit => RATE_LIMIT_BACKOFF_FACTOR,
            _ => BACKOFF_FACTOR,
        };
        calculate_backoff(self.base_delay, self.max_delay, factor, retry_count)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// Stop and report the failure
    GiveUp,
}

/// Decide the next step after `attempt` (1-based) failed with `kind`.
pub fn next_step(policy: &RetryPolicy, attempt: u32, kind: RetryErrorType) -> RetryStep {
    if !kind.is_retryable() || attempt >= policy.max_attempts {
        RetryStep::GiveUp
    } else {
        RetryStep::RetryAfter(policy.backoff(attempt.saturating_sub(1), kind))
    }
}

/// Turn a raw response into success or a classified failure.
pub fn classify_response(response: FetchResponse) -> FetchResult<FetchResponse> {
    if let Some(kind) = RetryErrorType::from_status(response.status) {
        let message = format!("HTTP {}", response.status);
        return Err(if kind.is_retryable() {
            FetchError::transient(kind, message)
        } else {
            FetchError::permanent(kind, message)
        });
    }
    if let Some(expected) = response.expected_len {
        let received = response.body.len() as u64;
        if received < expected {
            return Err(FetchError::transient(
                RetryErrorType::IncompleteBody,
                format!("received {received} of {expected} bytes"),
            ));
        }
    }
    Ok(response)
}

/// [`PageFetcher`] wrapper adding polite pacing, retry and backoff.
#[derive(Clone)]
pub struct RetryingClient {
    fetcher: Arc<dyn PageFetcher>,
    policy: RetryPolicy,
    delay: PoliteDelay,
    settings: FetchSettings,
}

impl RetryingClient {
    /// Wrap `fetcher` with the default pacing and timeouts.
    pub fn new(fetcher: Arc<dyn PageFetcher>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            delay: PoliteDelay::default(),
            settings: FetchSettings::default(),
        }
    }

    /// Set the polite delay applied before every attempt.
    pub fn with_polite_delay(mut self, delay: PoliteDelay) -> Self {
        self.delay = delay;
        self
    }

    /// Set request timeouts.
    pub fn with_settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Retry policy in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch an HTML page as text.
    pub async fn get_page(&self, url: &str) -> FetchResult<String> {
        let response = self
            .execute(FetchRequest::get(url, self.settings.page_timeout))
            .await?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// Fetch a document's bytes. An empty body is a permanent failure.
    pub async fn get_document(&self, url: &str) -> FetchResult<Vec<u8>> {
        let request = FetchRequest::get(url, self.settings.document_timeout)
            .with_header("Accept", "application/pdf,*/*;q=0.8");
        let response = self.execute(request).await?;
        if response.body.is_empty() {
            return Err(FetchError::permanent(
                RetryErrorType::MalformedResponse,
                "empty document",
            ));
        }
        Ok(response.body)
    }

    /// Run `request` until it succeeds, fails permanently or attempts run out.
    pub async fn execute(&self, request: FetchRequest) -> FetchResult<FetchResponse> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.delay.wait().await;

            let request_metrics = HttpRequestMetrics::start(&request.url, attempt);
            let result = self.fetcher.fetch(&request).await;
            match &result {
                Ok(response) => request_metrics.record_complete(response.status),
                Err(_) => request_metrics.record_network_error(),
            }

            let err = match result.and_then(classify_response) {
                Ok(response) => {
                    if attempt > 1 {
                        let ctx = RetryContext::new(
                            attempt,
                            self.policy.max_attempts,
                            RetryErrorType::NetworkGeneric,
                            Duration::ZERO,
                            "",
                            request.url.as_str(),
                        );
                        info!("{}", ctx.format_success());
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            let kind = err.kind();
            let step = if err.is_transient() {
                next_step(&self.policy, attempt, kind)
            } else {
                RetryStep::GiveUp
            };

            match step {
                RetryStep::GiveUp => {
                    let ctx = RetryContext::new(
                        attempt,
                        self.policy.max_attempts,
                        kind,
                        Duration::ZERO,
                        err.to_string(),
                        request.url.as_str(),
                    );
                    if err.is_transient() {
                        warn!("{}", ctx.format_failure());
                    } else {
                        debug!(url = %request.url, error = %err, "Permanent fetch failure");
                    }
                    return Err(err);
                }
                RetryStep::RetryAfter(backoff) => {
                    let ctx = RetryContext::new(
                        attempt + 1,
                        self.policy.max_attempts,
                        kind,
                        backoff,
                        err.to_string(),
                        request.url.as_str(),
                    );
                    warn!("{}", ctx.format_retry());
                    metrics::record_retry_backoff(backoff, attempt);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
