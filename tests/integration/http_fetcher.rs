//! The reqwest fetcher and a full partition run against a mock HTTP server

use crate::support::{listing_html, pdf, Row};
use court_opinion_archiver::downloader::PoliteDelay;
use court_opinion_archiver::fetcher::{FetchRequest, PageFetcher, ReqwestFetcher, RetryPolicy};
use court_opinion_archiver::output::{csv, PartitionLayout};
use court_opinion_archiver::pipeline::{Orchestrator, PipelineConfig};
use court_opinion_archiver::shutdown::ShutdownCoordinator;
use court_opinion_archiver::{Month, OpinionType};
use mockito::Matcher;
use std::time::Duration;
use tempfile::TempDir;

fn request(url: String) -> FetchRequest {
    FetchRequest::get(url, Duration::from_secs(5))
}

#[tokio::test]
async fn test_non_success_status_is_a_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/opinions/pdf/1.pdf")
        .with_status(503)
        .create_async()
        .await;

    let fetcher = ReqwestFetcher::new().unwrap();
    let response = fetcher
        .fetch(&request(format!("{}/opinions/pdf/1.pdf", server.url())))
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_browser_headers_and_request_headers_are_sent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/opinions/pdf/1025866.pdf")
        .match_header("user-agent", Matcher::Regex("Mozilla/5.0".into()))
        .match_header("accept", Matcher::Regex("application/pdf".into()))
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body(pdf("x"))
        .create_async()
        .await;

    let fetcher = ReqwestFetcher::new().unwrap();
    let response = fetcher
        .fetch(
            &request(format!("{}/opinions/pdf/1025866.pdf", server.url()))
                .with_header("Accept", "application/pdf,*/*;q=0.8"),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, pdf("x"));
    assert_eq!(response.expected_len, Some(pdf("x").len() as u64));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_refused_connection_is_transient() {
    let fetcher = ReqwestFetcher::new().unwrap();
    let err = fetcher
        .fetch(&request("http://127.0.0.1:1/opinions/pdf/1.pdf".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err}");
}

#[tokio::test]
async fn test_partition_run_over_http() {
    let mut server = mockito::Server::new_async().await;
    let rows = [
        Row::supreme("Jan. 16, 2025", "102,586-6", "1025866MAJ", "State v. Smith"),
        Row::supreme("Jan. 9, 2025", "102,410-0", "1024100MAJ", "Jones v. City of Tacoma"),
    ];
    let listing = server
        .mock("GET", "/opinions/index.cfm")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fa".into(), "opinions.byYear".into()),
            Matcher::UrlEncoded("fileYear".into(), "2025".into()),
            Matcher::UrlEncoded("crtLevel".into(), "S".into()),
            Matcher::UrlEncoded("pubStatus".into(), "PUB".into()),
        ]))
        .with_status(200)
        .with_body(listing_html(&rows))
        .expect(1)
        .create_async()
        .await;
    let smith = server
        .mock("GET", "/opinions/pdf/1025866.pdf")
        .with_status(200)
        .with_body(pdf("smith"))
        .expect(1)
        .create_async()
        .await;
    let jones = server
        .mock("GET", "/opinions/pdf/1024100.pdf")
        .with_status(404)
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::new(dir.path())
        .with_base_url(server.url())
        .with_years(vec![2025])
        .with_polite_delay(PoliteDelay::none())
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
        });
    let orchestrator = Orchestrator::from_config(config)
        .unwrap()
        .with_shutdown(ShutdownCoordinator::shared());

    let summary = orchestrator
        .run_partition(OpinionType::SupremeCourt)
        .await
        .unwrap();

    assert_eq!(summary.documents_succeeded, 1);
    assert_eq!(summary.documents_failed, 1);
    listing.assert_async().await;
    smith.assert_async().await;
    jones.assert_async().await;

    let layout = PartitionLayout::new(dir.path(), OpinionType::SupremeCourt);
    let saved = layout.month_dir(2025, Month::January).join("102,586-6_State v. Smith.pdf");
    assert_eq!(std::fs::read(saved).unwrap(), pdf("smith"));

    let rows = csv::read_rows(layout.metadata_path()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].case_info_url,
        format!(
            "{}/opinions/index.cfm?fa=opinions.showOpinion&filename=1025866MAJ",
            server.url()
        )
    );
    assert_eq!(rows[1].download_status, "Failed: not found: HTTP 404");
}
