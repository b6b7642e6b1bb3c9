//! Retry and backoff behavior of the retrying client
//!
//! Runs on paused tokio time, so backoff waits are observed exactly.

use crate::support::{pdf, timeout, ScriptedFetcher};
use court_opinion_archiver::downloader::{DocumentDownloader, PoliteDelay};
use court_opinion_archiver::fetcher::{
    FetchResponse, RetryErrorType, RetryPolicy, RetryingClient,
};
use court_opinion_archiver::{DownloadStatus, OpinionType};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const URL: &str = "https://courts.test/opinions/pdf/1025866.pdf";

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(10),
        max_delay: Duration::from_secs(300),
    }
}

fn client(fetcher: Arc<ScriptedFetcher>, policy: RetryPolicy) -> RetryingClient {
    RetryingClient::new(fetcher, policy).with_polite_delay(PoliteDelay::none())
}

fn gaps(fetcher: &ScriptedFetcher, url: &str) -> Vec<Duration> {
    fetcher
        .times(url)
        .windows(2)
        .map(|w| w[1].duration_since(w[0]))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_server_errors_retried_with_growing_backoff() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        URL,
        vec![
            Ok(FetchResponse::status(503)),
            Ok(FetchResponse::status(503)),
            Ok(FetchResponse::status(503)),
        ],
    );
    fetcher.page(URL, pdf("ok"));

    let bytes = client(fetcher.clone(), policy()).get_document(URL).await.unwrap();

    assert_eq!(bytes, pdf("ok"));
    assert_eq!(fetcher.count(URL), 4);
    let waited = gaps(&fetcher, URL);
    assert_eq!(
        waited,
        vec![
            Duration::from_secs(10),
            Duration::from_secs(20),
            Duration::from_secs(40)
        ]
    );
    assert!(waited.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backs_off_faster() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(
        URL,
        vec![Ok(FetchResponse::status(429)), Ok(FetchResponse::status(429))],
    );
    fetcher.page(URL, pdf("ok"));

    client(fetcher.clone(), policy()).get_document(URL).await.unwrap();

    assert_eq!(
        gaps(&fetcher, URL),
        vec![Duration::from_secs(10), Duration::from_secs(30)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transport_timeouts_exhaust_attempts() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(URL, (0..5).map(|_| timeout()).collect());

    let err = client(fetcher.clone(), policy()).get_document(URL).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(err.kind(), RetryErrorType::NetworkTimeout);
    assert_eq!(fetcher.count(URL), 5);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(URL, FetchResponse::status(404));

    let err = client(fetcher.clone(), policy()).get_document(URL).await.unwrap_err();

    assert_eq!(err.kind(), RetryErrorType::NotFound(404));
    assert!(!err.is_transient());
    assert_eq!(fetcher.count(URL), 1);
}

#[tokio::test(start_paused = true)]
async fn test_short_body_is_retried() {
    let fetcher = ScriptedFetcher::new();
    let mut truncated = FetchResponse::ok(pdf("partial"));
    truncated.expected_len = Some(4096);
    fetcher.script(URL, vec![Ok(truncated)]);
    fetcher.page(URL, pdf("whole"));

    let bytes = client(fetcher.clone(), policy()).get_document(URL).await.unwrap();

    assert_eq!(bytes, pdf("whole"));
    assert_eq!(fetcher.count(URL), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_document_is_a_permanent_failure() {
    let fetcher = ScriptedFetcher::new();
    fetcher.page(URL, Vec::new());

    let err = client(fetcher.clone(), policy()).get_document(URL).await.unwrap_err();

    assert_eq!(err.kind(), RetryErrorType::MalformedResponse);
    assert_eq!(fetcher.count(URL), 1);
}

#[tokio::test(start_paused = true)]
async fn test_polite_delay_precedes_every_attempt() {
    let fetcher = ScriptedFetcher::new();
    fetcher.script(URL, vec![Ok(FetchResponse::status(500))]);
    fetcher.page(URL, pdf("ok"));
    let delay = PoliteDelay::new(Duration::from_secs(2), Duration::from_secs(2));
    let client = RetryingClient::new(fetcher.clone(), policy()).with_polite_delay(delay);

    let start = tokio::time::Instant::now();
    client.get_document(URL).await.unwrap();

    let times = fetcher.times(URL);
    assert_eq!(times[0].duration_since(start), Duration::from_secs(2));
    // backoff 10s, then the polite delay again
    assert_eq!(times[1].duration_since(times[0]), Duration::from_secs(12));
}

#[tokio::test(start_paused = true)]
async fn test_downloader_records_failure_reason_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("2025").join("January").join("1_A_v._B.pdf");
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(URL, FetchResponse::status(410));
    let downloader = DocumentDownloader::new(client(fetcher, policy()), OpinionType::SupremeCourt);

    let status = downloader.download(URL, &destination).await.unwrap();

    match status {
        DownloadStatus::Failed(reason) => assert!(reason.contains("410"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!destination.exists());
}

#[tokio::test(start_paused = true)]
async fn test_downloader_skips_existing_nonempty_file() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("doc.pdf");
    std::fs::write(&destination, pdf("already here")).unwrap();
    let fetcher = ScriptedFetcher::new();
    let downloader = DocumentDownloader::new(client(fetcher.clone(), policy()), OpinionType::SupremeCourt);

    let status = downloader.download(URL, &destination).await.unwrap();

    assert_eq!(status, DownloadStatus::Success);
    assert!(fetcher.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_downloader_replaces_zero_byte_file() {
    let dir = TempDir::new().unwrap();
    let destination = dir.path().join("doc.pdf");
    std::fs::write(&destination, b"").unwrap();
    let fetcher = ScriptedFetcher::new();
    fetcher.page(URL, pdf("fresh"));
    let downloader = DocumentDownloader::new(client(fetcher.clone(), policy()), OpinionType::SupremeCourt);

    let status = downloader.download(URL, &destination).await.unwrap();

    assert_eq!(status, DownloadStatus::Success);
    assert_eq!(std::fs::read(&destination).unwrap(), pdf("fresh"));
    // No temp files left next to the document
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
}
