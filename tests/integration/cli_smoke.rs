//! End-to-end runs of the binary

use crate::support::{listing_html, pdf, Row};
use assert_cmd::Command;
use court_opinion_archiver::output::{csv, PartitionLayout};
use court_opinion_archiver::OpinionType;
use tempfile::TempDir;

fn archiver() -> Command {
    let mut cmd = Command::cargo_bin("court-opinion-archiver").unwrap();
    cmd.env("RUST_LOG", "off");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let output = archiver().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["scrape", "list-years", "info-sheets", "verify"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_invalid_arguments_are_rejected() {
    archiver()
        .args(["--concurrency", "0", "scrape"])
        .assert()
        .failure();
    archiver()
        .args(["scrape", "--type", "district_court"])
        .assert()
        .failure();
    archiver()
        .args(["scrape", "--type", "supreme_court", "--all-types"])
        .assert()
        .failure();
}

#[test]
fn test_verify_empty_root() {
    let dir = TempDir::new().unwrap();
    let output = archiver()
        .arg("--output-dir")
        .arg(dir.path())
        .arg("verify")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No checkpoints found"));
}

#[test]
fn test_verify_fails_on_corrupt_checkpoint() {
    let dir = TempDir::new().unwrap();
    let layout = PartitionLayout::new(dir.path(), OpinionType::AppealsPublished);
    std::fs::create_dir_all(layout.partition_dir()).unwrap();
    std::fs::write(layout.checkpoint_path(), "{\"schema_version\": 1").unwrap();

    archiver()
        .arg("--output-dir")
        .arg(dir.path())
        .arg("verify")
        .assert()
        .code(1);
}

#[test]
fn test_scrape_against_mock_site_then_verify() {
    let mut server = mockito::Server::new();
    let row = Row::supreme("Jan. 16, 2025", "102,586-6", "1025866MAJ", "State v. Smith");
    server
        .mock("GET", "/opinions/index.cfm")
        .match_query(mockito::Matcher::UrlEncoded("crtLevel".into(), "S".into()))
        .with_body(listing_html(std::slice::from_ref(&row)))
        .create();
    server
        .mock("GET", "/opinions/pdf/1025866.pdf")
        .with_body(pdf("smith"))
        .create();

    let dir = TempDir::new().unwrap();
    let output = archiver()
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--base-url", &server.url()])
        .args(["--delay-min", "0", "--delay-max", "0", "--output-format", "json"])
        .args(["scrape", "--type", "supreme_court", "--years", "2025"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["partitions"][0]["opinion_type"], "supreme_court");
    assert_eq!(report["partitions"][0]["summary"]["documents_succeeded"], 1);

    let layout = PartitionLayout::new(dir.path(), OpinionType::SupremeCourt);
    let rows = csv::read_rows(layout.metadata_path()).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].download_status, "Success");

    let output = archiver()
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--output-format", "json", "verify"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let checks: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(checks[0]["valid"], true);
    assert_eq!(checks[0]["completed_years"][0], 2025);
}

#[cfg(unix)]
#[test]
fn test_interrupt_saves_progress_and_exits_cleanly() {
    use assert_cmd::cargo::CommandCargoExt;
    use std::process::Stdio;
    use std::time::Duration;

    let mut server = mockito::Server::new();
    server
        .mock("GET", "/opinions/index.cfm")
        .match_query(mockito::Matcher::Any)
        .with_body(listing_html(&[]))
        .create();

    let dir = TempDir::new().unwrap();
    let child = std::process::Command::cargo_bin("court-opinion-archiver")
        .unwrap()
        .env("RUST_LOG", "off")
        .arg("--output-dir")
        .arg(dir.path())
        .args(["--base-url", &server.url()])
        .args(["--delay-min", "3", "--delay-max", "3", "--output-format", "json"])
        .args(["scrape", "--type", "supreme_court", "--years", "2025,2024"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    // The first listing request is still in its polite delay.
    std::thread::sleep(Duration::from_secs(1));
    let kill = std::process::Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(kill.success());

    let output = child.wait_with_output().unwrap();
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["interrupted"], true);
    assert_eq!(report["partitions"][0]["summary"]["years_visited"], serde_json::json!([2025]));

    let checkpoint = PartitionLayout::new(dir.path(), OpinionType::SupremeCourt).checkpoint_path();
    assert!(checkpoint.exists());
}
