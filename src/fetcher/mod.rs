//! Page fetching
//!
//! The archiver only needs one capability from the network: GET a URL with a
//! timeout and headers, and say whether a failure is worth retrying. That
//! capability is the [`PageFetcher`] trait; [`http::ReqwestFetcher`] is the
//! shipped implementation and [`retry::RetryingClient`] layers retry, backoff
//! and polite pacing on top of any implementation.

use async_trait::async_trait;
use std::time::Duration;

pub mod http;
pub mod retry;
pub mod retry_formatter;

pub use http::ReqwestFetcher;
pub use retry::{next_step, RetryPolicy, RetryStep, RetryingClient};
pub use retry_formatter::RetryErrorType;

use crate::downloader::config::{DEFAULT_DOCUMENT_TIMEOUT_SECS, DEFAULT_PAGE_TIMEOUT_SECS};

/// Fetch errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Worth retrying: timeouts, connection failures, 5xx, 429, short bodies
    #[error("{}: {message}", kind.description())]
    Transient {
        /// Classified cause
        kind: RetryErrorType,
        /// Detail for logs and the metadata row
        message: String,
    },

    /// Not worth retrying: 404 and other client errors, malformed responses
    #[error("{}: {message}", kind.description())]
    Permanent {
        /// Classified cause
        kind: RetryErrorType,
        /// Detail for logs and the metadata row
        message: String,
    },
}

impl FetchError {
    /// Transient error of `kind`.
    pub fn transient(kind: RetryErrorType, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    /// Permanent error of `kind`.
    pub fn permanent(kind: RetryErrorType, message: impl Into<String>) -> Self {
        Self::Permanent {
            kind,
            message: message.into(),
        }
    }

    /// Classified cause.
    pub fn kind(&self) -> RetryErrorType {
        match self {
            Self::Transient { kind, .. } | Self::Permanent { kind, .. } => *kind,
        }
    }

    /// Whether a retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// One GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute URL
    pub url: String,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Headers added to the fetcher's defaults
    pub headers: Vec<(String, String)>,
}

impl FetchRequest {
    /// GET `url` with `timeout` and no extra headers.
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response. Non-2xx statuses are responses, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Body bytes as received
    pub body: Vec<u8>,
    /// Announced `Content-Length`, if any
    pub expected_len: Option<u64>,
}

impl FetchResponse {
    /// 200 response with `body`.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            expected_len: Some(body.len() as u64),
            body,
        }
    }

    /// Empty response with `status`.
    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            expected_len: None,
        }
    }
}

/// GET capability the pipeline depends on.
///
/// Implementations honor `request.timeout`, return any HTTP response as
/// `Ok`, and classify transport failures as transient or permanent. A
/// browser-automation backend would implement this same trait.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Perform one request attempt.
    async fn fetch(&self, request: &FetchRequest) -> FetchResult<FetchResponse>;
}

/// Request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Timeout for HTML pages
    pub page_timeout: Duration,
    /// Timeout for PDF documents
    pub document_timeout: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_timeout: Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECS),
            document_timeout: Duration::from_secs(DEFAULT_DOCUMENT_TIMEOUT_SECS),
        }
    }
}

impl FetchSettings {
    /// Page timeout `timeout`, documents get twice as long.
    pub fn from_page_timeout(timeout: Duration) -> Self {
        Self {
            page_timeout: timeout,
            document_timeout: timeout * 2,
        }
    }
}
