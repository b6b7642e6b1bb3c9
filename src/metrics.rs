//! Production observability metrics for the archiver
//!
//! Counters and histograms for requests, retries and per-case outcomes. They
//! are recorded unconditionally through the `metrics` facade and exported only
//! when a Prometheus listener is installed with [`init_metrics`].
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (`--metrics-addr`)
//! - Graceful degradation: without an exporter every record call is a no-op

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::OpinionType;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: later calls return `Ok(())` without reinstalling.
pub fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(format!("Failed to install Prometheus exporter: {e}").into());
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the court site"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );
    describe_counter!(
        "documents_downloaded_total",
        Unit::Count,
        "Documents written to the archive"
    );
    describe_counter!(
        "documents_skipped_total",
        Unit::Count,
        "Documents already present with non-zero size"
    );
    describe_counter!(
        "documents_failed_total",
        Unit::Count,
        "Documents whose download failed"
    );
    describe_counter!(
        "cases_processed_total",
        Unit::Count,
        "Cases recorded in the metadata sink"
    );

    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Low-cardinality label for a court site URL.
pub fn endpoint_label(url: &str) -> &'static str {
    if url.contains("/opinions/pdf/") {
        "document"
    } else if url.contains("opinions.byYear") {
        "listing"
    } else if url.contains("opinions.displayAll") {
        "year_index"
    } else if url.contains("showOpinionTextOnly") {
        "info_sheet"
    } else {
        "other"
    }
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    endpoint: &'static str,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(url: &str, attempt: u32) -> Self {
        let endpoint = endpoint_label(url);
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            url = %url,
            attempt = attempt,
            "Starting HTTP request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            warn!(
                correlation_id = %self.correlation_id,
                endpoint = self.endpoint,
                attempt = self.attempt,
                "Rate limit response (429) from court site"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "endpoint" => self.endpoint,
            "status" => "network_error",
        )
        .increment(1);
        histogram!(
            "http_request_duration_seconds",
            "endpoint" => self.endpoint,
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "http_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!("retry_backoff_duration_seconds").record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Outcome of one document for [`record_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Written to disk
    Downloaded,
    /// Already present
    Skipped,
    /// Download failed
    Failed,
}

/// Record a document outcome for a partition.
pub fn record_document(opinion_type: OpinionType, outcome: DocumentOutcome) {
    let name = match outcome {
        DocumentOutcome::Downloaded => "documents_downloaded_total",
        DocumentOutcome::Skipped => "documents_skipped_total",
        DocumentOutcome::Failed => "documents_failed_total",
    };
    counter!(name, "opinion_type" => opinion_type.key()).increment(1);
}

/// Record a case appended to the metadata sink.
pub fn record_case_processed(opinion_type: OpinionType) {
    counter!("cases_processed_total", "opinion_type" => opinion_type.key()).increment(1);
}
