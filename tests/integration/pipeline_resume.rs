//! Integration tests for the partition pipeline and its resume behavior
//!
//! Every test drives the real orchestrator against a scripted fetcher and a
//! temporary archive root, then inspects the files left on disk.

use crate::support::{
    listing_html, metadata_rows, orchestrator, pdf, test_config, year_index_html, Row,
    ScriptedFetcher, BASE,
};
use court_opinion_archiver::fetcher::FetchResponse;
use court_opinion_archiver::listing::SiteUrls;
use court_opinion_archiver::output::{document_filename, PartitionLayout};
use court_opinion_archiver::pipeline::{PipelineError, PipelineState};
use court_opinion_archiver::resume::CheckpointState;
use court_opinion_archiver::{Month, OpinionType};
use std::sync::Arc;
use tempfile::TempDir;

const SC: OpinionType = OpinionType::SupremeCourt;

fn urls() -> SiteUrls {
    SiteUrls::new(BASE).unwrap()
}

fn supreme_rows() -> Vec<Row> {
    vec![
        Row::supreme("Feb. 6, 2025", "103,001-2", "1030012MAJ", "State v. Alvarez"),
        Row::supreme("Jan. 30, 2025", "102,944-6", "1029446MAJ", "In re Pers. Restraint of Lee"),
        Row::supreme("Jan. 16, 2025", "102,586-6", "1025866MAJ", "State v. Smith"),
    ]
}

/// Fetcher serving the 2025 Supreme Court listing and every document in it.
fn serve_supreme(rows: &[Row]) -> Arc<ScriptedFetcher> {
    let fetcher = ScriptedFetcher::new();
    fetcher.page(urls().listing(SC, 2025), listing_html(rows));
    for row in rows {
        fetcher.page(row.pdf_url(), pdf(row.number));
    }
    fetcher
}

fn load_checkpoint(root: &std::path::Path, opinion_type: OpinionType) -> CheckpointState {
    let layout = PartitionLayout::new(root, opinion_type);
    CheckpointState::load_or_new(&layout.checkpoint_path(), opinion_type).unwrap()
}

#[tokio::test]
async fn test_full_run_writes_documents_rows_and_checkpoint() {
    let dir = TempDir::new().unwrap();
    let rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    let (orchestrator, _) = orchestrator(test_config(dir.path()).with_years(vec![2025]), fetcher.clone());

    let summary = orchestrator.run_partition(SC).await.unwrap();

    assert_eq!(summary.years_visited, vec![2025]);
    assert_eq!(summary.cases_seen, 3);
    assert_eq!(summary.cases_processed, 3);
    assert_eq!(summary.documents_succeeded, 3);
    assert_eq!(summary.documents_failed, 0);
    assert!(!summary.interrupted);
    assert_eq!(summary.final_state, PipelineState::Finished);

    let layout = PartitionLayout::new(dir.path(), SC);
    let smith = layout.document_path(
        2025,
        Month::January,
        &document_filename("102,586-6", "State v. Smith"),
    );
    assert_eq!(std::fs::read(&smith).unwrap(), pdf("102,586-6"));
    assert!(layout
        .month_dir(2025, Month::February)
        .join(document_filename("103,001-2", "State v. Alvarez"))
        .exists());

    let written = metadata_rows(dir.path(), SC);
    assert_eq!(written.len(), 3);
    assert_eq!(written[0].case_number, "103,001-2");
    assert_eq!(written[0].opinion_type, "Supreme Court");
    assert_eq!(written[0].publication_status, "Published");
    assert_eq!(written[0].month, "February");
    assert_eq!(written[0].division, "");
    assert_eq!(written[2].pdf_url, rows[2].pdf_url());
    assert!(written.iter().all(|r| r.download_status == "Success"));
    assert!(written.iter().all(|r| !r.scraped_at.is_empty()));

    let state = load_checkpoint(dir.path(), SC);
    assert_eq!(state.handled_count(), 3);
    assert!(state.is_year_completed(2025));
    assert!(state.failed_cases().is_empty());
}

#[tokio::test]
async fn test_rerun_of_completed_year_fetches_and_appends_nothing() {
    let dir = TempDir::new().unwrap();
    let fetcher = serve_supreme(&supreme_rows());
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    first.run_partition(SC).await.unwrap();
    let requests_after_first = fetcher.requests().len();

    let (second, _) = orchestrator(config, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();

    assert_eq!(summary.years_skipped, vec![2025]);
    assert!(summary.years_visited.is_empty());
    assert_eq!(summary.cases_processed, 0);
    assert_eq!(fetcher.requests().len(), requests_after_first);
    assert_eq!(metadata_rows(dir.path(), SC).len(), 3);
}

#[tokio::test]
async fn test_refresh_revisits_year_but_skips_handled_cases() {
    let dir = TempDir::new().unwrap();
    let mut rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    first.run_partition(SC).await.unwrap();

    // A late filing shows up on the listing
    let late = Row::supreme("Feb. 13, 2025", "103,120-5", "1031205MAJ", "Doe v. Roe");
    rows.insert(0, late.clone());
    fetcher.page(urls().listing(SC, 2025), listing_html(&rows));
    fetcher.page(late.pdf_url(), pdf(late.number));

    let mut refresh = config;
    refresh.refresh = true;
    let (second, _) = orchestrator(refresh, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();

    assert_eq!(summary.cases_skipped, 3);
    assert_eq!(summary.cases_processed, 1);
    assert_eq!(fetcher.document_requests().len(), 4);
    let written = metadata_rows(dir.path(), SC);
    assert_eq!(written.len(), 4);
    assert_eq!(written[3].case_number, "103,120-5");
}

#[tokio::test]
async fn test_failed_download_is_recorded_and_retried_on_request() {
    let dir = TempDir::new().unwrap();
    let rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    fetcher.respond(rows[1].pdf_url(), FetchResponse::status(404));
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    let summary = first.run_partition(SC).await.unwrap();
    assert_eq!(summary.documents_succeeded, 2);
    assert_eq!(summary.documents_failed, 1);
    // 404 is not retried
    assert_eq!(fetcher.count(&rows[1].pdf_url()), 1);

    let written = metadata_rows(dir.path(), SC);
    assert!(written[1].download_status.starts_with("Failed: "));
    assert!(written[1].download_status.contains("404"));
    let state = load_checkpoint(dir.path(), SC);
    assert!(state.is_year_completed(2025));
    assert_eq!(state.failed_cases().len(), 1);

    // Without --retry-failed the failure stays recorded
    let (plain, _) = orchestrator(config.clone(), fetcher.clone());
    let summary = plain.run_partition(SC).await.unwrap();
    assert_eq!(summary.cases_processed, 0);
    assert_eq!(fetcher.count(&rows[1].pdf_url()), 1);

    fetcher.page(rows[1].pdf_url(), pdf(rows[1].number));
    let mut retry = config;
    retry.retry_failed = true;
    let (retrying, _) = orchestrator(retry, fetcher.clone());
    let summary = retrying.run_partition(SC).await.unwrap();

    assert_eq!(summary.cases_processed, 1);
    assert_eq!(summary.cases_skipped, 2);
    assert_eq!(summary.documents_succeeded, 1);
    let written = metadata_rows(dir.path(), SC);
    assert_eq!(written.len(), 4);
    assert_eq!(written[3].case_number, rows[1].number);
    assert_eq!(written[3].download_status, "Success");
    assert!(load_checkpoint(dir.path(), SC).failed_cases().is_empty());
}

#[tokio::test]
async fn test_interrupted_run_resumes_without_repeating_cases() {
    let dir = TempDir::new().unwrap();
    let rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    let config = test_config(dir.path())
        .with_years(vec![2025])
        .with_concurrency(1);

    let (first, shutdown) = orchestrator(config.clone(), fetcher.clone());
    fetcher.trip_shutdown_on(rows[1].pdf_url(), shutdown.clone());
    let summary = first.run_partition(SC).await.unwrap();

    // The in-flight case finishes and is recorded, nothing new starts
    assert!(summary.interrupted);
    assert_eq!(summary.final_state, PipelineState::Interrupted);
    assert_eq!(summary.cases_processed, 2);
    assert_eq!(fetcher.count(&rows[2].pdf_url()), 0);
    assert_eq!(metadata_rows(dir.path(), SC).len(), 2);
    let state = load_checkpoint(dir.path(), SC);
    assert_eq!(state.handled_count(), 2);
    assert!(!state.is_year_completed(2025));

    let (second, _) = orchestrator(config, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();

    assert!(!summary.interrupted);
    assert_eq!(summary.cases_skipped, 2);
    assert_eq!(summary.cases_processed, 1);
    for row in &rows {
        assert_eq!(fetcher.count(&row.pdf_url()), 1, "{} fetched once", row.number);
    }
    let numbers: Vec<String> = metadata_rows(dir.path(), SC)
        .into_iter()
        .map(|r| r.case_number)
        .collect();
    assert_eq!(numbers, vec!["103,001-2", "102,944-6", "102,586-6"]);
    assert!(load_checkpoint(dir.path(), SC).is_year_completed(2025));
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_download_finish_its_retries() {
    let dir = TempDir::new().unwrap();
    let rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    fetcher.script(rows[0].pdf_url(), vec![Ok(FetchResponse::status(503))]);
    let config = test_config(dir.path())
        .with_years(vec![2025])
        .with_concurrency(1);

    let (orchestrator, shutdown) = orchestrator(config, fetcher.clone());
    fetcher.trip_shutdown_on(rows[0].pdf_url(), shutdown.clone());
    let summary = orchestrator.run_partition(SC).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.cases_processed, 1);
    assert_eq!(summary.documents_succeeded, 1);
    assert_eq!(fetcher.count(&rows[0].pdf_url()), 2);
    assert_eq!(fetcher.count(&rows[1].pdf_url()), 0);

    let written = metadata_rows(dir.path(), SC);
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].case_number, rows[0].number);
    assert_eq!(written[0].download_status, "Success");
    assert_eq!(load_checkpoint(dir.path(), SC).handled_count(), 1);
}

#[tokio::test]
async fn test_shutdown_before_start_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let fetcher = serve_supreme(&supreme_rows());
    let (orchestrator, shutdown) = orchestrator(test_config(dir.path()).with_years(vec![2025]), fetcher.clone());
    shutdown.request_shutdown();

    let summary = orchestrator.run_partition(SC).await.unwrap();

    assert!(summary.interrupted);
    assert!(fetcher.requests().is_empty());
    assert!(!PartitionLayout::new(dir.path(), SC).metadata_path().exists());
}

#[tokio::test]
async fn test_metadata_rows_missing_from_checkpoint_are_reconciled() {
    let dir = TempDir::new().unwrap();
    let fetcher = serve_supreme(&supreme_rows());
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    first.run_partition(SC).await.unwrap();

    // Crash between appending rows and saving the checkpoint
    let layout = PartitionLayout::new(dir.path(), SC);
    std::fs::remove_file(layout.checkpoint_path()).unwrap();
    let documents_before = fetcher.document_requests().len();

    let (second, _) = orchestrator(config, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();

    assert_eq!(summary.reconciled_cases, 3);
    assert_eq!(summary.years_visited, vec![2025]);
    assert_eq!(summary.cases_skipped, 3);
    assert_eq!(summary.cases_processed, 0);
    assert_eq!(fetcher.document_requests().len(), documents_before);
    assert_eq!(metadata_rows(dir.path(), SC).len(), 3);
    assert!(load_checkpoint(dir.path(), SC).is_year_completed(2025));
}

#[tokio::test]
async fn test_no_resume_discards_checkpoint_but_keeps_documents() {
    let dir = TempDir::new().unwrap();
    let fetcher = serve_supreme(&supreme_rows());
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    first.run_partition(SC).await.unwrap();
    let documents_before = fetcher.document_requests().len();

    let mut fresh = config;
    fresh.resume = false;
    let (second, _) = orchestrator(fresh, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();

    assert_eq!(summary.reconciled_cases, 0);
    assert_eq!(summary.cases_processed, 3);
    assert_eq!(summary.documents_succeeded, 3);
    // Documents already on disk are not downloaded again
    assert_eq!(fetcher.document_requests().len(), documents_before);
    assert_eq!(metadata_rows(dir.path(), SC).len(), 6);
}

#[tokio::test]
async fn test_unreachable_listing_leaves_year_incomplete() {
    let dir = TempDir::new().unwrap();
    let rows = supreme_rows();
    let fetcher = serve_supreme(&rows);
    fetcher.script(urls().listing(SC, 2025), vec![Ok(FetchResponse::status(404))]);
    let config = test_config(dir.path()).with_years(vec![2025]);

    let (first, _) = orchestrator(config.clone(), fetcher.clone());
    let summary = first.run_partition(SC).await.unwrap();
    assert_eq!(summary.failed_years, vec![2025]);
    assert_eq!(summary.cases_seen, 0);
    assert!(!load_checkpoint(dir.path(), SC).is_year_completed(2025));

    let (second, _) = orchestrator(config, fetcher.clone());
    let summary = second.run_partition(SC).await.unwrap();
    assert!(summary.failed_years.is_empty());
    assert_eq!(summary.cases_processed, 3);
    assert!(load_checkpoint(dir.path(), SC).is_year_completed(2025));
}

#[tokio::test]
async fn test_bad_rows_are_counted_and_underivable_urls_recorded_as_failed() {
    let dir = TempDir::new().unwrap();
    let rows = vec![
        Row::supreme("Jan. 16, 2025", "102,586-6", "1025866MAJ", "State v. Smith"),
        Row::supreme("Smarch 1, 2025", "102,000-1", "1020001MAJ", "Bad Date v. Row"),
        Row::supreme("Jan. 9, 2025", "101,777-4", "1017774ABCDE", "State v. Odd"),
    ];
    let fetcher = serve_supreme(&rows);
    let (orchestrator, _) = orchestrator(test_config(dir.path()).with_years(vec![2025]), fetcher.clone());

    let summary = orchestrator.run_partition(SC).await.unwrap();

    assert_eq!(summary.malformed_rows, 1);
    assert_eq!(summary.cases_seen, 2);
    assert_eq!(summary.documents_succeeded, 1);
    assert_eq!(summary.documents_failed, 1);
    assert_eq!(fetcher.document_requests(), vec![rows[0].pdf_url()]);

    let written = metadata_rows(dir.path(), SC);
    assert_eq!(written.len(), 2);
    assert_eq!(written[1].case_number, "101,777-4");
    assert_eq!(written[1].pdf_url, "");
    assert!(written[1].download_status.starts_with("Failed: "));
}

#[tokio::test]
async fn test_discovered_years_processed_newest_first_and_test_mode_takes_one() {
    let dir = TempDir::new().unwrap();
    let fetcher = ScriptedFetcher::new();
    fetcher.page(urls().year_index(), year_index_html(&[2023, 2025, 2024], &[2025]));
    for year in [2023, 2024, 2025] {
        fetcher.page(urls().listing(SC, year), listing_html(&[]));
    }

    let (all, _) = orchestrator(test_config(dir.path()), fetcher.clone());
    let summary = all.run_partition(SC).await.unwrap();
    assert_eq!(summary.years_visited, vec![2025, 2024, 2023]);

    let listings: Vec<String> = fetcher
        .requests()
        .into_iter()
        .filter(|u| u.contains("byYear"))
        .collect();
    assert_eq!(
        listings,
        vec![
            urls().listing(SC, 2025),
            urls().listing(SC, 2024),
            urls().listing(SC, 2023)
        ]
    );

    let other = TempDir::new().unwrap();
    let mut config = test_config(other.path());
    config.test_mode = true;
    let (test_mode, _) = orchestrator(config, fetcher.clone());
    let summary = test_mode.run_partition(SC).await.unwrap();
    assert_eq!(summary.years_visited, vec![2025]);
}

#[tokio::test]
async fn test_appeals_partition_records_division_in_its_own_folder() {
    let dir = TempDir::new().unwrap();
    let row = Row::appeals("Mar. 4, 2025", "58123-1-II", "II", "581231MAJ", "State v. Nguyen");
    let fetcher = ScriptedFetcher::new();
    fetcher.page(
        urls().listing(OpinionType::AppealsPublished, 2025),
        listing_html(std::slice::from_ref(&row)),
    );
    fetcher.page(row.pdf_url(), pdf(row.number));
    let (orchestrator, _) = orchestrator(test_config(dir.path()).with_years(vec![2025]), fetcher);

    let summary = orchestrator
        .run_partition(OpinionType::AppealsPublished)
        .await
        .unwrap();
    assert_eq!(summary.documents_succeeded, 1);

    let layout = PartitionLayout::new(dir.path(), OpinionType::AppealsPublished);
    assert!(layout.partition_dir().ends_with("Court_of_Appeals_Published"));
    assert!(layout
        .document_path(2025, Month::March, &document_filename(row.number, row.title))
        .exists());
    let written = metadata_rows(dir.path(), OpinionType::AppealsPublished);
    assert_eq!(written[0].division, "II");
    assert_eq!(written[0].opinion_type, "Court of Appeals");
    assert!(metadata_rows(dir.path(), SC).is_empty());
}

#[tokio::test]
async fn test_corrupt_checkpoint_fails_only_its_partition() {
    let dir = TempDir::new().unwrap();
    let supreme = PartitionLayout::new(dir.path(), SC);
    std::fs::create_dir_all(supreme.partition_dir()).unwrap();
    std::fs::write(supreme.checkpoint_path(), "{ not json").unwrap();

    let row = Row::appeals("Mar. 4, 2025", "58123-1-II", "II", "581231MAJ", "State v. Nguyen");
    let fetcher = serve_supreme(&supreme_rows());
    fetcher.page(
        urls().listing(OpinionType::AppealsPublished, 2025),
        listing_html(std::slice::from_ref(&row)),
    );
    fetcher.page(row.pdf_url(), pdf(row.number));

    let (orchestrator, shutdown) = orchestrator(test_config(dir.path()).with_years(vec![2025]), fetcher.clone());
    let report = orchestrator
        .run(&[SC, OpinionType::AppealsPublished])
        .await;

    assert!(!report.is_success());
    assert!(!shutdown.is_shutdown_requested());
    let err = report.partitions[0].result.as_ref().unwrap_err();
    assert!(matches!(err, PipelineError::CheckpointCorruption { .. }));
    assert!(err.to_string().contains("--no-resume"));
    assert_eq!(fetcher.count(&urls().listing(SC, 2025)), 0);

    let appeals = report.partitions[1].result.as_ref().unwrap();
    assert_eq!(appeals.documents_succeeded, 1);
    // The damaged file is left for the operator
    assert_eq!(
        std::fs::read_to_string(supreme.checkpoint_path()).unwrap(),
        "{ not json"
    );
}
