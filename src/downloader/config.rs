//! Download configuration constants

use std::time::Duration;

/// Maximum number of attempts per request (first try included).
pub const MAX_ATTEMPTS: u32 = 5;

/// Backoff before the first retry.
pub const INITIAL_BACKOFF_SECS: u64 = 10;

/// Ceiling for any single backoff.
pub const MAX_BACKOFF_SECS: u64 = 300;

/// Backoff growth factor for ordinary transient failures.
pub const BACKOFF_FACTOR: u64 = 2;

/// Backoff growth factor after an HTTP 429.
pub const RATE_LIMIT_BACKOFF_FACTOR: u64 = 3;

/// Polite delay range before each request, in milliseconds.
pub const POLITE_DELAY_MIN_MS: u64 = 1_000;
/// Upper end of the polite delay range, in milliseconds.
pub const POLITE_DELAY_MAX_MS: u64 = 2_000;

/// Timeout for HTML pages.
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 30;

/// Timeout for PDF documents.
pub const DEFAULT_DOCUMENT_TIMEOUT_SECS: u64 = 2 * DEFAULT_PAGE_TIMEOUT_SECS;

/// Default number of concurrent document downloads per partition.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for `--concurrency`.
pub const MAX_CONCURRENCY: usize = 16;

/// Calculate exponential backoff delay: `base * factor^retry_count`, capped at `ceiling`.
pub fn calculate_backoff(base: Duration, ceiling: Duration, factor: u64, retry_count: u32) -> Duration {
    let multiplier = factor.checked_pow(retry_count).unwrap_or(u64::MAX);
    let delay_ms = (base.as_millis() as u64).saturating_mul(multiplier);
    Duration::from_millis(delay_ms).min(ceiling)
}
