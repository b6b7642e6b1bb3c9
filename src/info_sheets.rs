//! Opinion information sheets
//!
//! Every case has a printer-friendly information page next to its PDF. This
//! pass reads a partition's `metadata.csv` and stores those pages as
//! `{year}/{month}/{case_number}_info.html`, tracking handled sheets in
//! `info_sheet_checkpoint.json` so an interrupted pass resumes where it stopped.

use crate::downloader::is_nonempty_file;
use crate::listing::filename_token;
use crate::output::sanitize::info_sheet_filename;
use crate::output::{self, csv, MetadataRow, OutputError, PartitionLayout};
use crate::pipeline::runner::discard_checkpoint;
use crate::pipeline::{Orchestrator, PipelineError};
use crate::resume::state::{load_json, save_json};
use crate::resume::{PartitionLock, ResumeError, SCHEMA_VERSION};
use crate::{Month, OpinionType};
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn, Instrument};

/// Handled info sheets of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoSheetCheckpoint {
    schema_version: String,
    #[serde(default)]
    handled: BTreeSet<String>,
    updated_at: i64,
}

impl Default for InfoSheetCheckpoint {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            handled: BTreeSet::new(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl InfoSheetCheckpoint {
    /// Load from `path`, or start empty when the file does not exist.
    pub fn load_or_new(path: &Path) -> Result<Self, ResumeError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let checkpoint: Self = load_json(path)?;
        if checkpoint.schema_version != SCHEMA_VERSION {
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: checkpoint.schema_version,
            });
        }
        Ok(checkpoint)
    }

    /// Persist atomically.
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        save_json(path, self)
    }

    /// Whether `sheet_id` was stored before.
    pub fn is_handled(&self, sheet_id: &str) -> bool {
        self.handled.contains(sheet_id)
    }

    /// Remember `sheet_id` as stored.
    pub fn mark_handled(&mut self, sheet_id: &str) {
        if self.handled.insert(sheet_id.to_string()) {
            self.updated_at = chrono::Utc::now().timestamp_millis();
        }
    }

    /// Number of stored sheets.
    pub fn len(&self) -> usize {
        self.handled.len()
    }

    /// Whether nothing was stored yet.
    pub fn is_empty(&self) -> bool {
        self.handled.is_empty()
    }
}

/// Identifier of an info sheet: `{case_number}_{filename_token}`.
pub fn sheet_id(case_number: &str, token: &str) -> String {
    format!("{case_number}_{token}")
}

/// Counts for one partition's info-sheet pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoSheetSummary {
    /// Partition
    pub opinion_type: OpinionType,
    /// Distinct sheets referenced by the selected rows
    pub total: u64,
    /// Sheets fetched and written
    pub downloaded: u64,
    /// Sheets already handled or already on disk
    pub skipped: u64,
    /// Sheets that could not be fetched; retried on the next pass
    pub failed: u64,
    /// Rows without a usable filename token or month
    pub unusable_rows: u64,
    /// Whether the pass stopped on a shutdown request
    pub interrupted: bool,
}

impl InfoSheetSummary {
    fn new(opinion_type: OpinionType) -> Self {
        Self {
            opinion_type,
            total: 0,
            downloaded: 0,
            skipped: 0,
            failed: 0,
            unusable_rows: 0,
            interrupted: false,
        }
    }
}

struct SheetJob {
    id: String,
    url: String,
    destination: PathBuf,
}

enum SheetOutcome {
    Downloaded,
    Present,
    Failed(String),
}

/// Download the info sheets of `opinion_type`, optionally only for `years`.
///
/// Uses the orchestrator's client, concurrency and shutdown coordinator. When
/// the orchestrator is configured without resume, the sheet checkpoint is
/// discarded first and every sheet is considered again.
pub async fn download_info_sheets(
    orchestrator: &Orchestrator,
    opinion_type: OpinionType,
    years: Option<&[u16]>,
) -> Result<InfoSheetSummary, PipelineError> {
    let span = info_span!("info_sheets", opinion_type = %opinion_type);
    run_pass(orchestrator, opinion_type, years).instrument(span).await
}

async fn run_pass(
    orchestrator: &Orchestrator,
    opinion_type: OpinionType,
    years: Option<&[u16]>,
) -> Result<InfoSheetSummary, PipelineError> {
    let mut summary = InfoSheetSummary::new(opinion_type);
    let layout = PartitionLayout::new(&orchestrator.config().output_root, opinion_type);
    output::ensure_dir(&layout.partition_dir())?;
    let _lock = PartitionLock::try_acquire(&layout.lock_path()).map_err(|e| match e {
        ResumeError::Locked(_) => PipelineError::PartitionLocked {
            opinion_type,
            path: layout.lock_path(),
        },
        other => PipelineError::Checkpoint(other),
    })?;

    let checkpoint_path = layout.info_checkpoint_path();
    if !orchestrator.config().resume {
        discard_checkpoint(&checkpoint_path)?;
    }
    let mut checkpoint = InfoSheetCheckpoint::load_or_new(&checkpoint_path).map_err(|source| {
        if source.is_corruption() {
            PipelineError::CheckpointCorruption {
                path: checkpoint_path.clone(),
                source,
            }
        } else {
            PipelineError::Checkpoint(source)
        }
    })?;

    let rows = csv::read_rows(layout.metadata_path())?;
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for row in rows
        .iter()
        .filter(|row| years.map_or(true, |years| years.contains(&row.year)))
    {
        let Some((id, job)) = plan_job(orchestrator, &layout, row) else {
            summary.unusable_rows += 1;
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        summary.total += 1;
        if checkpoint.is_handled(&id) {
            summary.skipped += 1;
            continue;
        }
        jobs.push(job);
    }
    info!(
        total = summary.total,
        pending = jobs.len(),
        handled = checkpoint.len(),
        "Fetching info sheets"
    );

    let planned = jobs.len() as u64;
    let shutdown = orchestrator.shutdown().clone();
    let mut results = stream::iter(jobs)
        .take_while(move |_| future::ready(!shutdown.is_shutdown_requested()))
        .map(|job| fetch_sheet(orchestrator, job))
        .buffered(orchestrator.config().concurrency.max(1));

    let mut finished = 0u64;
    while let Some(result) = results.next().await {
        let (id, outcome) = result?;
        finished += 1;
        match outcome {
            SheetOutcome::Downloaded => summary.downloaded += 1,
            SheetOutcome::Present => summary.skipped += 1,
            SheetOutcome::Failed(reason) => {
                warn!(sheet = %id, error = %reason, "Info sheet failed");
                summary.failed += 1;
                continue;
            }
        }
        checkpoint.mark_handled(&id);
        checkpoint
            .save(&checkpoint_path)
            .map_err(PipelineError::Checkpoint)?;
    }
    if finished < planned {
        summary.interrupted = true;
    }

    info!(
        downloaded = summary.downloaded,
        skipped = summary.skipped,
        failed = summary.failed,
        interrupted = summary.interrupted,
        "Info sheets finished"
    );
    Ok(summary)
}

fn plan_job(
    orchestrator: &Orchestrator,
    layout: &PartitionLayout,
    row: &MetadataRow,
) -> Option<(String, SheetJob)> {
    let token = match filename_token(&row.case_info_url) {
        Ok(token) => token,
        Err(e) => {
            debug!(case_number = %row.case_number, error = %e, "No info sheet token");
            return None;
        }
    };
    let month = Month::from_token(&row.month)
        .or_else(|| Month::from_file_date(&row.file_date).ok())?;
    let id = sheet_id(&row.case_number, &token);
    let job = SheetJob {
        id: id.clone(),
        url: orchestrator.urls().info_sheet(&token),
        destination: layout
            .month_dir(row.year, month)
            .join(info_sheet_filename(&row.case_number)),
    };
    Some((id, job))
}

async fn fetch_sheet(
    orchestrator: &Orchestrator,
    job: SheetJob,
) -> Result<(String, SheetOutcome), OutputError> {
    if is_nonempty_file(&job.destination).await {
        return Ok((job.id, SheetOutcome::Present));
    }
    let html = match orchestrator.client().get_page(&job.url).await {
        Ok(html) if html.trim().is_empty() => {
            return Ok((job.id, SheetOutcome::Failed("empty info sheet".to_string())))
        }
        Ok(html) => html,
        Err(e) => return Ok((job.id, SheetOutcome::Failed(e.to_string()))),
    };

    let destination = job.destination.clone();
    tokio::task::spawn_blocking(move || output::write_atomic(&destination, html.as_bytes()))
        .await
        .map_err(|e| OutputError::IoError(format!("info sheet writer task failed: {e}")))??;
    debug!(path = %job.destination.display(), "Info sheet saved");
    Ok((job.id, SheetOutcome::Downloaded))
}
