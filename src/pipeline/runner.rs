//! Partition runner
//!
//! One partition at a time (or several, with `partitions_parallel`): lock the
//! partition, load its checkpoint, reconcile it against `metadata.csv`, then
//! walk the years most recent first. Within a year documents download through
//! an ordered buffered stream and a single writer appends the metadata row and
//! then saves the checkpoint, case by case.

use super::{
    PartitionReport, PartitionSummary, PipelineConfig, PipelineError, PipelineState,
    ProgressReporter, RunReport,
};
use crate::downloader::{DocumentDownloader, DownloadError, ProgressState};
use crate::fetcher::{FetchResult, PageFetcher, ReqwestFetcher, RetryingClient};
use crate::listing::{
    parse_available_years, parse_listing, ListedCase, ListingContext, ListingPage,
    ListingPosition, SiteUrls,
};
use crate::metrics::{self, DocumentOutcome};
use crate::output::{self, csv, MetadataSink, OutputError, PartitionLayout};
use crate::resume::{CheckpointState, PartitionLock, ResumeError};
use crate::shutdown::{self, ShutdownCoordinator, SharedShutdown};
use crate::{case_id, CaseRecord, DownloadStatus, OpinionType};
use chrono::Utc;
use futures::{future, stream, StreamExt};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Drives the crawl for a set of partitions.
pub struct Orchestrator {
    config: PipelineConfig,
    client: RetryingClient,
    urls: SiteUrls,
    shutdown: SharedShutdown,
    reporter: Option<Arc<dyn ProgressReporter>>,
}

struct WorkItem {
    case: ListedCase,
    case_id: String,
}

struct ProcessedCase {
    record: CaseRecord,
    case_id: String,
    position: ListingPosition,
}

/// Mutable state of one partition run, owned by the single writer.
struct PartitionRun {
    layout: PartitionLayout,
    state: CheckpointState,
    sink: MetadataSink,
    summary: PartitionSummary,
}

impl Orchestrator {
    /// Orchestrator backed by the reqwest fetcher.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        let fetcher = ReqwestFetcher::new()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {e}")))?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Orchestrator over any [`PageFetcher`].
    pub fn with_fetcher(
        config: PipelineConfig,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Result<Self, PipelineError> {
        let urls = SiteUrls::new(&config.base_url)
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        let shutdown = shutdown::get_global_shutdown().unwrap_or_else(ShutdownCoordinator::shared);
        let client = RetryingClient::new(fetcher, config.retry)
            .with_polite_delay(config.polite_delay)
            .with_settings(config.fetch);

        Ok(Self {
            config,
            client,
            urls,
            shutdown,
            reporter: None,
        })
    }

    /// Use `shutdown` instead of the global coordinator.
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Report per-case progress to `reporter`.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Retrying client shared by every request of the run.
    pub fn client(&self) -> &RetryingClient {
        &self.client
    }

    /// Site URL builder.
    pub fn urls(&self) -> &SiteUrls {
        &self.urls
    }

    /// Shutdown coordinator observed by the run.
    pub fn shutdown(&self) -> &SharedShutdown {
        &self.shutdown
    }

    /// Years the site lists for `opinion_type`, most recent first.
    pub async fn discover_years(&self, opinion_type: OpinionType) -> FetchResult<Vec<u16>> {
        let html = self.client.get_page(&self.urls.year_index()).await?;
        let years = parse_available_years(&html, opinion_type);
        info!(opinion_type = %opinion_type, count = years.len(), "Discovered years");
        Ok(years)
    }

    /// Process `partitions`, up to `partitions_parallel` at a time.
    ///
    /// A run-fatal error in one partition requests shutdown, so the others stop
    /// after their in-flight cases.
    pub async fn run(&self, partitions: &[OpinionType]) -> RunReport {
        let parallel = self.config.partitions_parallel.max(1);
        let partitions = stream::iter(partitions.iter().copied())
            .map(|opinion_type| async move {
                let result = self.run_partition(opinion_type).await;
                if let Err(e) = &result {
                    if e.is_run_fatal() {
                        error!(opinion_type = %opinion_type, error = %e, "Fatal error, stopping the run");
                        self.shutdown.request_shutdown();
                    } else {
                        error!(opinion_type = %opinion_type, error = %e, "Partition aborted");
                    }
                }
                PartitionReport {
                    opinion_type,
                    result,
                }
            })
            .buffered(parallel)
            .collect::<Vec<_>>()
            .await;
        RunReport { partitions }
    }

    /// Process one partition.
    pub async fn run_partition(
        &self,
        opinion_type: OpinionType,
    ) -> Result<PartitionSummary, PipelineError> {
        let span = info_span!("partition", opinion_type = %opinion_type);
        self.run_partition_inner(opinion_type).instrument(span).await
    }

    async fn run_partition_inner(
        &self,
        opinion_type: OpinionType,
    ) -> Result<PartitionSummary, PipelineError> {
        let mut summary = PartitionSummary::new(opinion_type);
        if self.shutdown.is_shutdown_requested() {
            summary.interrupted = true;
            summary.final_state = PipelineState::Interrupted;
            return Ok(summary);
        }

        let layout = PartitionLayout::new(&self.config.output_root, opinion_type);
        output::ensure_dir(&layout.partition_dir())?;
        let _lock = PartitionLock::try_acquire(&layout.lock_path()).map_err(|e| match e {
            ResumeError::Locked(_) => PipelineError::PartitionLocked {
                opinion_type,
                path: layout.lock_path(),
            },
            other => PipelineError::Checkpoint(other),
        })?;

        let mut state = self.open_checkpoint(&layout)?;
        if self.config.resume {
            summary.reconciled_cases = reconcile_metadata(&layout, &mut state)?;
        }
        let sink = MetadataSink::open(layout.metadata_path())?;
        let mut run = PartitionRun {
            layout,
            state,
            sink,
            summary,
        };

        debug!(state = %PipelineState::EnumeratingYears, "Partition state");
        let years = match self.years_for(opinion_type).await {
            Ok(years) => years,
            Err(e) => return Err(PipelineError::Discovery(e)),
        };
        if years.is_empty() {
            warn!("No years to process");
        }
        info!(
            years = ?years,
            handled = run.state.handled_count(),
            resume_after = ?run.state.position(),
            "Processing partition"
        );

        for year in years {
            if self.shutdown.is_shutdown_requested() {
                run.summary.interrupted = true;
                break;
            }
            if !self.should_visit(&run.state, year) {
                debug!(year, "Year already complete, skipping");
                run.summary.years_skipped.push(year);
                continue;
            }

            run.summary.final_state = PipelineState::EnumeratingCases { year };
            debug!(state = %run.summary.final_state, "Partition state");
            let html = match self.client.get_page(&self.urls.listing(opinion_type, year)).await {
                Ok(html) => html,
                Err(e) => {
                    error!(year, error = %e, "Failed to fetch listing, leaving year incomplete");
                    run.summary.failed_years.push(year);
                    continue;
                }
            };
            run.summary.years_visited.push(year);

            let page = parse_listing(&html, ListingContext { opinion_type, year }, &self.urls);
            run.summary.malformed_rows += page.malformed.len() as u64;
            run.summary.cases_seen += page.cases.len() as u64;

            if self.process_year(&mut run, year, page).await? {
                run.state.complete_year(year);
                run.state
                    .save(&run.layout.checkpoint_path())
                    .map_err(PipelineError::Checkpoint)?;
                info!(year, "Year complete");
            } else {
                run.summary.interrupted = true;
                break;
            }
        }

        self.finish(run)
    }

    fn finish(&self, run: PartitionRun) -> Result<PartitionSummary, PipelineError> {
        let PartitionRun {
            sink, mut summary, ..
        } = run;
        sink.close()?;
        summary.final_state = if summary.interrupted {
            PipelineState::Interrupted
        } else {
            PipelineState::Finished
        };
        info!(
            processed = summary.cases_processed,
            succeeded = summary.documents_succeeded,
            failed = summary.documents_failed,
            skipped = summary.cases_skipped,
            malformed = summary.malformed_rows,
            failed_years = ?summary.failed_years,
            interrupted = summary.interrupted,
            "Partition finished"
        );
        Ok(summary)
    }

    /// Download and record the pending cases of one year.
    ///
    /// Returns `false` when shutdown stopped the year before every case was recorded.
    async fn process_year(
        &self,
        run: &mut PartitionRun,
        year: u16,
        page: ListingPage,
    ) -> Result<bool, PipelineError> {
        let opinion_type = run.layout.opinion_type();
        let mut work = Vec::new();
        for case in page.cases {
            let case_id = case.record.case_id();
            let retry = self.config.retry_failed && run.state.is_failed(&case_id);
            if run.state.is_handled(&case_id) && !retry {
                run.summary.cases_skipped += 1;
                continue;
            }
            work.push(WorkItem { case, case_id });
        }
        if work.is_empty() {
            debug!(year, "No pending cases");
            return Ok(true);
        }

        let total = work.len();
        info!(year, pending = total, "Processing cases");
        if let Some(reporter) = &self.reporter {
            reporter.year_started(opinion_type, year, total);
        }
        let mut progress = ProgressState::new(total as u64, format!("{} {year}", opinion_type.key()));

        let downloader = DocumentDownloader::new(self.client.clone(), opinion_type);
        let checkpoint_path = run.layout.checkpoint_path();
        let layout = &run.layout;
        let shutdown = self.shutdown.clone();
        let mut results = stream::iter(work)
            .take_while(move |_| future::ready(!shutdown.is_shutdown_requested()))
            .map(|item| self.process_case(&downloader, layout, item))
            .buffered(self.config.concurrency.max(1));

        let mut recorded = 0usize;
        while let Some(result) = results.next().await {
            let ProcessedCase {
                record,
                case_id,
                position,
            } = match result {
                Ok(processed) => processed,
                Err(DownloadError::Output(e)) => return Err(PipelineError::Filesystem(e)),
            };

            run.sink.append(&record)?;
            run.state
                .record_case(&case_id, position, record.month, &record.download_status);
            run.state
                .save(&checkpoint_path)
                .map_err(PipelineError::Checkpoint)?;

            recorded += 1;
            run.summary.cases_processed += 1;
            if record.download_status.is_success() {
                run.summary.documents_succeeded += 1;
            } else {
                run.summary.documents_failed += 1;
            }
            run.summary.final_state = PipelineState::ProcessingCase {
                year,
                month_index: position.month_index,
                case_index: position.case_index,
            };
            metrics::record_case_processed(opinion_type);
            if let Some(reporter) = &self.reporter {
                reporter.case_recorded(&record);
            }

            progress.record_case();
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }
        }

        let finished = recorded == total;
        if !finished {
            info!(year, recorded, pending = total - recorded, "Stopping year on shutdown request");
        }
        Ok(finished)
    }

    async fn process_case(
        &self,
        downloader: &DocumentDownloader,
        layout: &PartitionLayout,
        item: WorkItem,
    ) -> Result<ProcessedCase, DownloadError> {
        let WorkItem { case, case_id } = item;
        let mut record = case.record;
        let file_name = output::document_filename(&record.case_number, &record.case_title);

        record.download_status = match self.urls.derive_document_url(&record.case_info_url) {
            Ok(url) => {
                let destination = layout.document_path(record.year, record.month, &file_name);
                let status = downloader.download(&url, &destination).await?;
                record.document_url = Some(url);
                status
            }
            Err(e) => {
                warn!(case_number = %record.case_number, error = %e, "Cannot derive document URL");
                metrics::record_document(layout.opinion_type(), DocumentOutcome::Failed);
                DownloadStatus::Failed(e.to_string())
            }
        };
        record.local_filename = Some(file_name);
        record.scraped_at = Some(Utc::now());

        Ok(ProcessedCase {
            record,
            case_id,
            position: case.position,
        })
    }

    async fn years_for(&self, opinion_type: OpinionType) -> FetchResult<Vec<u16>> {
        let mut years = match &self.config.years {
            Some(list) => {
                let mut years = list.clone();
                years.sort_unstable_by(|a, b| b.cmp(a));
                years.dedup();
                years
            }
            None => self.discover_years(opinion_type).await?,
        };
        if self.config.test_mode {
            years.truncate(1);
        }
        Ok(years)
    }

    fn should_visit(&self, state: &CheckpointState, year: u16) -> bool {
        if !state.is_year_completed(year) || self.config.refresh {
            return true;
        }
        self.config.retry_failed && state.years_with_failures().contains(&year)
    }

    fn open_checkpoint(&self, layout: &PartitionLayout) -> Result<CheckpointState, PipelineError> {
        let path = layout.checkpoint_path();
        let opinion_type = layout.opinion_type();
        if !self.config.resume {
            discard_checkpoint(&path)?;
            return Ok(CheckpointState::new(opinion_type));
        }

        CheckpointState::load_or_new(&path, opinion_type).map_err(|source| {
            if source.is_corruption() {
                PipelineError::CheckpointCorruption {
                    path: path.clone(),
                    source,
                }
            } else {
                PipelineError::Checkpoint(source)
            }
        })
    }
}

/// Remove the checkpoint at `path`, if any.
pub(crate) fn discard_checkpoint(path: &Path) -> Result<(), PipelineError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Discarded existing checkpoint");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PipelineError::Filesystem(OutputError::IoError(format!(
            "Failed to remove {}: {e}",
            path.display()
        )))),
    }
}

/// Fold rows already in `metadata.csv` into the checkpoint.
///
/// Returns the number of cases that changed.
fn reconcile_metadata(
    layout: &PartitionLayout,
    state: &mut CheckpointState,
) -> Result<u64, PipelineError> {
    let rows = csv::read_rows(layout.metadata_path())?;
    let mut changed = 0u64;
    for row in &rows {
        let id = case_id(layout.opinion_type(), &row.case_number, &row.case_info_url);
        let failed = row.download_status.starts_with("Failed");
        if state.reconcile(&id, row.year, failed) {
            changed += 1;
        }
    }
    if changed > 0 {
        warn!(cases = changed, "Metadata rows missing from the checkpoint, reconciled");
        state
            .save(&layout.checkpoint_path())
            .map_err(PipelineError::Checkpoint)?;
    }
    Ok(changed)
}
