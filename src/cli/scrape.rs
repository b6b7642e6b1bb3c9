//! Scrape command and global options

use crate::downloader::config::{
    DEFAULT_CONCURRENCY, DEFAULT_PAGE_TIMEOUT_SECS, INITIAL_BACKOFF_SECS, MAX_ATTEMPTS,
    MAX_BACKOFF_SECS, MAX_CONCURRENCY,
};
use crate::downloader::PoliteDelay;
use crate::fetcher::{FetchSettings, RetryPolicy};
use crate::listing::urls::DEFAULT_BASE_URL;
use crate::pipeline::{
    Orchestrator, PartitionReport, PipelineConfig, ProgressReporter, RunReport,
};
use crate::shutdown::SharedShutdown;
use crate::{CaseRecord, OpinionType};
use clap::{Args, Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};

use super::CliError;

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Parse a non-negative number of seconds
fn parse_seconds(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number of seconds"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("'{s}' must be a non-negative number of seconds"));
    }
    Ok(value)
}

/// Court opinion archiver CLI
#[derive(Parser, Debug)]
#[command(name = "court-opinion-archiver")]
#[command(about = "Archive published court opinions and their metadata", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Archive root directory
    #[arg(long, global = true, default_value = "downloads")]
    pub output_dir: PathBuf,

    /// Court site base URL
    #[arg(long, global = true, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Output format (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,

    /// Concurrent document downloads per partition (default: 4, max: 16)
    ///
    /// The polite delay applies to every request, so higher values mostly
    /// overlap transfer time. Keep this low; the court site is a public service.
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Partitions processed at the same time
    #[arg(long, global = true, default_value = "1", value_parser = clap::value_parser!(u32).range(1..=4))]
    pub partitions_parallel: u32,

    /// Attempts per request, first try included (range: 1-20)
    #[arg(long, global = true, default_value_t = MAX_ATTEMPTS, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: u32,

    /// Backoff before the first retry, in seconds
    #[arg(long, global = true, default_value_t = INITIAL_BACKOFF_SECS as f64, value_parser = parse_seconds)]
    pub retry_delay: f64,

    /// Ceiling for a single backoff, in seconds
    #[arg(long, global = true, default_value_t = MAX_BACKOFF_SECS as f64, value_parser = parse_seconds)]
    pub max_retry_delay: f64,

    /// Lower bound of the random pause before each request, in seconds
    #[arg(long, global = true, default_value = "1.0", value_parser = parse_seconds)]
    pub delay_min: f64,

    /// Upper bound of the random pause before each request, in seconds
    #[arg(long, global = true, default_value = "2.0", value_parser = parse_seconds)]
    pub delay_max: f64,

    /// Page timeout in seconds; documents get twice as long
    #[arg(long, global = true, default_value_t = DEFAULT_PAGE_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,

    /// Disable progress bars
    #[arg(long, global = true, default_value_t = false)]
    pub no_progress: bool,
}

impl Cli {
    /// Pipeline configuration from the global options.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, CliError> {
        if self.delay_min > self.delay_max {
            return Err(CliError::InvalidArgument(format!(
                "--delay-min ({}) exceeds --delay-max ({})",
                self.delay_min, self.delay_max
            )));
        }
        if self.timeout == 0 {
            return Err(CliError::InvalidArgument(
                "--timeout must be at least 1 second".to_string(),
            ));
        }

        let mut config = PipelineConfig::new(&self.output_dir)
            .with_base_url(self.base_url.clone())
            .with_concurrency(self.concurrency)
            .with_retry(RetryPolicy {
                max_attempts: self.max_retries,
                base_delay: Duration::from_secs_f64(self.retry_delay),
                max_delay: Duration::from_secs_f64(self.max_retry_delay.max(self.retry_delay)),
            })
            .with_polite_delay(PoliteDelay::new(
                Duration::from_secs_f64(self.delay_min),
                Duration::from_secs_f64(self.delay_max),
            ));
        config.partitions_parallel = self.partitions_parallel as usize;
        config.fetch = FetchSettings::from_page_timeout(Duration::from_secs(self.timeout));
        Ok(config)
    }
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl listings and download opinions
    Scrape(ScrapeArgs),

    /// List the years the site offers per opinion type
    ListYears(super::ListYearsCommand),

    /// Download case information sheets for archived opinions
    InfoSheets(super::InfoSheetsCommand),

    /// Check every checkpoint under the output directory
    Verify(super::VerifyCommand),
}

/// Opinion types to work on.
#[derive(Args, Debug, Clone, Default)]
pub struct TypeSelection {
    /// Opinion type: supreme_court, appeals_published, appeals_partial, appeals_unpublished
    #[arg(long = "type", short = 't')]
    pub types: Vec<OpinionType>,

    /// Every opinion type (the default when no --type is given)
    #[arg(long, default_value_t = false, conflicts_with = "types")]
    pub all_types: bool,
}

impl TypeSelection {
    /// Selected types without duplicates, in the order given.
    pub fn resolve(&self) -> Vec<OpinionType> {
        if self.all_types || self.types.is_empty() {
            return OpinionType::ALL.to_vec();
        }
        let mut resolved = Vec::with_capacity(self.types.len());
        for t in &self.types {
            if !resolved.contains(t) {
                resolved.push(*t);
            }
        }
        resolved
    }
}

/// Scrape command arguments
#[derive(Parser, Debug)]
pub struct ScrapeArgs {
    /// Opinion types
    #[command(flatten)]
    pub selection: TypeSelection,

    /// Only these years (comma separated), processed most recent first
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<u16>,

    /// Only the most recent year
    #[arg(long, default_value_t = false)]
    pub test: bool,

    /// Discard existing checkpoints and start over
    #[arg(long, default_value_t = false)]
    pub no_resume: bool,

    /// Re-process cases whose download failed before
    #[arg(long, default_value_t = false)]
    pub retry_failed: bool,

    /// Re-fetch listings of years already marked complete
    #[arg(long, default_value_t = false)]
    pub refresh: bool,
}

impl ScrapeArgs {
    /// Pipeline configuration for this run.
    pub fn pipeline_config(&self, cli: &Cli) -> Result<PipelineConfig, CliError> {
        let mut config = cli.pipeline_config()?;
        if !self.years.is_empty() {
            config = config.with_years(self.years.clone());
        }
        config.test_mode = self.test;
        config.resume = !self.no_resume;
        config.retry_failed = self.retry_failed;
        config.refresh = self.refresh;
        Ok(config)
    }

    /// Run the crawl and print a summary per partition.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let types = self.selection.resolve();
        let config = self.pipeline_config(cli)?;
        info!(
            types = ?types.iter().map(|t| t.key()).collect::<Vec<_>>(),
            output = %config.output_root.display(),
            concurrency = config.concurrency,
            "Starting scrape"
        );

        let mut orchestrator = Orchestrator::from_config(config)?.with_shutdown(shutdown);
        let bars = if cli.no_progress || matches!(cli.output_format, OutputFormat::Json) {
            None
        } else {
            let bars = Arc::new(BarReporter::default());
            orchestrator = orchestrator.with_reporter(bars.clone());
            Some(bars)
        };

        let report = orchestrator.run(&types).await;
        if let Some(bars) = bars {
            bars.finish();
        }

        match cli.output_format {
            OutputFormat::Json => output_json(&report),
            OutputFormat::Human => output_human(&report),
        }

        let failed = report.partitions.iter().filter(|p| p.result.is_err()).count();
        if failed > 0 {
            return Err(CliError::PartitionsFailed {
                failed,
                total: report.partitions.len(),
            });
        }
        Ok(())
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

fn partition_json(partition: &PartitionReport) -> serde_json::Value {
    match &partition.result {
        Ok(summary) => serde_json::json!({
            "opinion_type": partition.opinion_type.key(),
            "success": true,
            "summary": summary,
            "error": null,
        }),
        Err(e) => serde_json::json!({
            "opinion_type": partition.opinion_type.key(),
            "success": false,
            "summary": null,
            "error": e.to_string(),
        }),
    }
}

/// Output the run report as one JSON document
fn output_json(report: &RunReport) {
    let output = serde_json::json!({
        "success": report.is_success(),
        "interrupted": report.interrupted(),
        "partitions": report.partitions.iter().map(partition_json).collect::<Vec<_>>(),
    });
    match serde_json::to_string(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => error!("Failed to serialize report: {e}"),
    }
}

/// Output the run report in human-readable format
fn output_human(report: &RunReport) {
    for partition in &report.partitions {
        let name = partition.opinion_type.key();
        match &partition.result {
            Ok(summary) => {
                let status = if summary.interrupted { "interrupted" } else { "done" };
                println!("\n{name}: {status}");
                println!(
                    "  Years: {} visited, {} already complete",
                    summary.years_visited.len(),
                    summary.years_skipped.len()
                );
                println!(
                    "  Cases: {} seen, {} processed, {} skipped",
                    summary.cases_seen, summary.cases_processed, summary.cases_skipped
                );
                println!(
                    "  Documents: {} succeeded, {} failed",
                    summary.documents_succeeded, summary.documents_failed
                );
                if summary.malformed_rows > 0 {
                    println!("  Malformed listing rows: {}", summary.malformed_rows);
                }
                if !summary.failed_years.is_empty() {
                    println!("  Years with unreachable listings: {:?}", summary.failed_years);
                }
            }
            Err(e) => {
                eprintln!("\n{name}: failed");
                eprintln!("  Error: {e}");
            }
        }
    }
    if report.interrupted() {
        println!("\nInterrupted; rerun the same command to resume.");
    }
}

/// One progress bar per partition.
#[derive(Default)]
struct BarReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<OpinionType, ProgressBar>>,
}

impl BarReporter {
    fn finish(&self) {
        if let Ok(bars) = self.bars.lock() {
            for bar in bars.values() {
                bar.finish_and_clear();
            }
        }
    }
}

impl ProgressReporter for BarReporter {
    fn year_started(&self, opinion_type: OpinionType, year: u16, pending: usize) {
        let Ok(mut bars) = self.bars.lock() else {
            return;
        };
        let bar = bars.entry(opinion_type).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(0));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .expect("hardcoded template is valid")
                    .progress_chars("#>-"),
            );
            bar
        });
        bar.set_length(pending as u64);
        bar.set_position(0);
        bar.set_message(format!("{} {year}", opinion_type.key()));
    }

    fn case_recorded(&self, record: &CaseRecord) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(&record.opinion_type) {
                bar.inc(1);
            }
        }
    }
}
