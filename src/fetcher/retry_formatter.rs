//! Retry classification and log message formatting.
//!
//! [`RetryErrorType`] is the single vocabulary for "what went wrong" across
//! the fetch layer: the reqwest fetcher classifies transport failures with it,
//! the retry policy decides on it, and [`RetryContext`] turns it into the
//! messages operators see.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of fetch errors for retry decisions and user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryErrorType {
    /// Network timeout or connection stalled long enough to trigger a timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// Body shorter than the announced Content-Length
    IncompleteBody,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 404 / 410
    NotFound(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 408 and 429)
    ClientError(u16),
    /// A 2xx response that cannot be used (empty document, bad URL)
    MalformedResponse,
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// User-friendly description string used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::IncompleteBody => "incomplete download",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::NotFound(_) => "not found",
            Self::AuthFailed(code) => match code {
                401 => "authentication required (401)",
                403 => "access forbidden (403)",
                _ => "access denied",
            },
            Self::ClientError(_) => "client error",
            Self::MalformedResponse => "malformed response",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation presented with actionable guidance after failures.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection or raise --timeout",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::IncompleteBody => "The connection dropped mid-transfer; rerun to retry",
            Self::RateLimit => "Increase --delay-min/--delay-max or lower --concurrency",
            Self::ServerError(_) => "The court site may be having issues, try again later",
            Self::NotFound(_) => "The document may have been withdrawn or moved",
            Self::AuthFailed(_) => "The site refused access; check --base-url",
            Self::ClientError(_) => "Review the request URL or --base-url",
            Self::MalformedResponse => "Inspect the case info page; the listing may have changed",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }

    /// Determine whether the error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RetryErrorType::NotFound(_)
                | RetryErrorType::AuthFailed(_)
                | RetryErrorType::ClientError(_)
                | RetryErrorType::MalformedResponse
        )
    }

    /// Classify a non-success HTTP status. Returns `None` for 2xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            404 | 410 => Some(Self::NotFound(status)),
            401 | 403 => Some(Self::AuthFailed(status)),
            408 => Some(Self::NetworkTimeout),
            429 => Some(Self::RateLimit),
            500..=599 => Some(Self::ServerError(status)),
            400..=499 => Some(Self::ClientError(status)),
            _ => Some(Self::MalformedResponse),
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered retry
    pub error_type: RetryErrorType,
    /// Backoff duration until next attempt
    pub backoff_duration: Duration,
    /// Original error message for details
    pub error_message: String,
    /// URL that failed
    pub endpoint: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        error_message: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            error_message: error_message.into(),
            endpoint: endpoint.into(),
        }
    }

    /// Format standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format retry success message when a previous attempt eventually works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!("[FAILED] Request failed after {} attempt(s)", self.attempt),
            format!("  Last error: {}", self.error_message),
            format!("  URL: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];
        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }
        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.error_type.suggestion().to_string()];
        if self.error_type.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-retries (current: {})",
                self.max_attempts
            ));
            suggestions.push("Failed cases can be retried later with --retry-failed".to_string());
        }
        suggestions
    }
}

/// Extract a [`RetryErrorType`] from an HTTP status or reqwest error.
pub fn extract_error_type(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> RetryErrorType {
    if let Some(kind) = status.and_then(|s| RetryErrorType::from_status(s.as_u16())) {
        return kind;
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return RetryErrorType::NetworkTimeout;
        }
        if err.is_connect() {
            return RetryErrorType::NetworkOffline;
        }
        if err.is_builder() {
            return RetryErrorType::MalformedResponse;
        }
    }

    RetryErrorType::NetworkGeneric
}
