//! Crawl orchestration
//!
//! The [`Orchestrator`] walks partitions → years → listing pages → cases. Each
//! partition has its own output subtree, checkpoint and metadata sink, so
//! partitions can run side by side without sharing mutable state.
//!
//! ```text
//! Idle → EnumeratingYears → EnumeratingCases(year) → ProcessingCase(year, month, index)
//!                                                   ↘ Finished | Interrupted
//! ```

use crate::downloader::config::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use crate::downloader::PoliteDelay;
use crate::fetcher::{FetchError, FetchSettings, RetryPolicy};
use crate::listing::urls::DEFAULT_BASE_URL;
use crate::output::OutputError;
use crate::resume::ResumeError;
use crate::{CaseRecord, OpinionType};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub mod runner;

pub use runner::Orchestrator;

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Archive root
    pub output_root: PathBuf,
    /// Court site base URL
    pub base_url: String,
    /// Explicit year allow-list; `None` discovers years from the site
    pub years: Option<Vec<u16>>,
    /// Only the most recent year
    pub test_mode: bool,
    /// Use existing checkpoints; `false` discards them
    pub resume: bool,
    /// Re-process cases whose last attempt failed
    pub retry_failed: bool,
    /// Re-fetch listings of years already marked complete
    pub refresh: bool,
    /// Concurrent document downloads per partition
    pub concurrency: usize,
    /// Partitions processed at the same time
    pub partitions_parallel: usize,
    /// Retry policy for every request
    pub retry: RetryPolicy,
    /// Pause before every request
    pub polite_delay: PoliteDelay,
    /// Request timeouts
    pub fetch: FetchSettings,
}

impl PipelineConfig {
    /// Defaults writing under `output_root`.
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            years: None,
            test_mode: false,
            resume: true,
            retry_failed: false,
            refresh: false,
            concurrency: DEFAULT_CONCURRENCY,
            partitions_parallel: 1,
            retry: RetryPolicy::default(),
            polite_delay: PoliteDelay::default(),
            fetch: FetchSettings::default(),
        }
    }

    /// Restrict to `years`.
    pub fn with_years(mut self, years: Vec<u16>) -> Self {
        self.years = Some(years);
        self
    }

    /// Use another site base.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set download concurrency, clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the polite delay.
    pub fn with_polite_delay(mut self, delay: PoliteDelay) -> Self {
        self.polite_delay = delay;
        self
    }

    /// Keep (`true`) or discard existing checkpoints.
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Where a partition's run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    /// Not started
    Idle,
    /// Looking up the years to process
    EnumeratingYears,
    /// Fetching and parsing a year's listing
    EnumeratingCases {
        /// Listing year
        year: u16,
    },
    /// Downloading and recording cases of a year
    ProcessingCase {
        /// Listing year
        year: u16,
        /// Month group of the case last recorded
        month_index: u32,
        /// Case within the group
        case_index: u32,
    },
    /// Every requested year was visited
    Finished,
    /// Stopped early on a shutdown request
    Interrupted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::EnumeratingYears => f.write_str("enumerating years"),
            Self::EnumeratingCases { year } => write!(f, "enumerating cases of {year}"),
            Self::ProcessingCase {
                year,
                month_index,
                case_index,
            } => write!(f, "processing {year} month {month_index} case {case_index}"),
            Self::Finished => f.write_str("finished"),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Counts reported for one partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionSummary {
    /// Partition
    pub opinion_type: OpinionType,
    /// Years whose listing was fetched
    pub years_visited: Vec<u16>,
    /// Years skipped as already complete
    pub years_skipped: Vec<u16>,
    /// Years whose listing could not be fetched
    pub failed_years: Vec<u16>,
    /// Cases found on fetched listings
    pub cases_seen: u64,
    /// Cases recorded in this run
    pub cases_processed: u64,
    /// Cases skipped as already handled
    pub cases_skipped: u64,
    /// Recorded cases whose document is on disk
    pub documents_succeeded: u64,
    /// Recorded cases whose download failed
    pub documents_failed: u64,
    /// Listing rows that could not be read
    pub malformed_rows: u64,
    /// Cases found in the metadata file but missing from the checkpoint
    pub reconciled_cases: u64,
    /// Whether the partition stopped on a shutdown request
    pub interrupted: bool,
    /// State the partition ended in
    pub final_state: PipelineState,
}

impl PartitionSummary {
    /// Empty summary for `opinion_type`.
    pub fn new(opinion_type: OpinionType) -> Self {
        Self {
            opinion_type,
            years_visited: Vec::new(),
            years_skipped: Vec::new(),
            failed_years: Vec::new(),
            cases_seen: 0,
            cases_processed: 0,
            cases_skipped: 0,
            documents_succeeded: 0,
            documents_failed: 0,
            malformed_rows: 0,
            reconciled_cases: 0,
            interrupted: false,
            final_state: PipelineState::Idle,
        }
    }
}

/// Outcome of one partition.
#[derive(Debug)]
pub struct PartitionReport {
    /// Partition
    pub opinion_type: OpinionType,
    /// Summary, or why the partition was aborted
    pub result: Result<PartitionSummary, PipelineError>,
}

/// Outcome of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// One report per requested partition, in request order
    pub partitions: Vec<PartitionReport>,
}

impl RunReport {
    /// Whether every partition completed without error.
    pub fn is_success(&self) -> bool {
        self.partitions.iter().all(|p| p.result.is_ok())
    }

    /// Whether any partition stopped on a shutdown request.
    pub fn interrupted(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| matches!(&p.result, Ok(summary) if summary.interrupted))
    }
}

/// Observer for per-case progress, used by the CLI's progress bars.
pub trait ProgressReporter: Send + Sync {
    /// A year's listing was parsed and `pending` cases are queued.
    fn year_started(&self, _opinion_type: OpinionType, _year: u16, _pending: usize) {}

    /// A case was recorded.
    fn case_recorded(&self, _record: &CaseRecord) {}
}

/// Pipeline errors
///
/// Partition-fatal errors stop one partition; run-fatal errors
/// ([`PipelineError::is_run_fatal`]) stop every partition.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Existing checkpoint cannot be trusted
    #[error(
        "checkpoint {path} is corrupt ({source}); rerun with --no-resume to discard it and restart this partition"
    )]
    CheckpointCorruption {
        /// Checkpoint file
        path: PathBuf,
        /// What was wrong
        source: ResumeError,
    },

    /// Another process holds the partition
    #[error("partition {opinion_type} is locked by another process ({path})")]
    PartitionLocked {
        /// Partition
        opinion_type: OpinionType,
        /// Lock file
        path: PathBuf,
    },

    /// Years could not be discovered from the site
    #[error("could not discover years: {0}")]
    Discovery(FetchError),

    /// Checkpoint could not be locked, loaded or persisted
    #[error("checkpoint error: {0}")]
    Checkpoint(ResumeError),

    /// The archive could not be written
    #[error("filesystem error: {0}")]
    Filesystem(#[from] OutputError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    /// Whether the whole run must stop.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            Self::Checkpoint(_) | Self::Filesystem(_) | Self::Configuration(_)
        )
    }
}
