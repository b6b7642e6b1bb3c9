//! Document downloads and request pacing
//!
//! # Overview
//!
//! [`DocumentDownloader`] turns a document URL and a destination path into a
//! [`DownloadStatus`]:
//!
//! 1. **File-level resume**: an existing non-empty file is an immediate success
//! 2. **Fetch**: through [`RetryingClient`], which applies the polite delay,
//!    retries transient failures and gives up on permanent ones
//! 3. **Atomic write**: bytes land in a temporary sibling that is renamed into place
//!
//! Fetch failures never escape: they become `Failed(reason)`. Only filesystem
//! errors (the archive itself is broken) are returned as [`DownloadError`].
//! A started download always runs its retries to the end, even after a
//! shutdown request.
//!
//! # Components
//!
//! - [`config`] - Defaults and backoff calculation
//! - [`rate_limit`] - Polite delay between requests
//! - [`progress`] - Per-year progress reporting

pub mod config;
pub mod progress;
pub mod rate_limit;

pub use progress::ProgressState;
pub use rate_limit::PoliteDelay;

use crate::fetcher::RetryingClient;
use crate::metrics::{self, DocumentOutcome};
use crate::output::{self, OutputError};
use crate::{DownloadStatus, OpinionType};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The archive could not be written
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

/// Fetches documents and stores them atomically.
#[derive(Clone)]
pub struct DocumentDownloader {
    client: RetryingClient,
    opinion_type: OpinionType,
}

impl DocumentDownloader {
    /// Downloader for one partition.
    pub fn new(client: RetryingClient, opinion_type: OpinionType) -> Self {
        Self {
            client,
            opinion_type,
        }
    }

    /// Download `url` to `destination` unless a non-empty file is already there.
    pub async fn download(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadStatus, DownloadError> {
        if is_nonempty_file(destination).await {
            debug!(path = %destination.display(), "Document already present, skipping download");
            metrics::record_document(self.opinion_type, DocumentOutcome::Skipped);
            return Ok(DownloadStatus::Success);
        }

        let bytes = match self.client.get_document(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = %url, error = %e, "Document download failed");
                metrics::record_document(self.opinion_type, DocumentOutcome::Failed);
                return Ok(DownloadStatus::Failed(e.to_string()));
            }
        };

        let size = bytes.len();
        let target: PathBuf = destination.to_path_buf();
        tokio::task::spawn_blocking(move || output::write_atomic(&target, &bytes))
            .await
            .map_err(|e| OutputError::IoError(format!("document writer task failed: {e}")))??;

        info!(path = %destination.display(), bytes = size, "Document saved");
        metrics::record_document(self.opinion_type, DocumentOutcome::Downloaded);
        Ok(DownloadStatus::Success)
    }
}

/// Whether `path` is a regular file with at least one byte.
pub async fn is_nonempty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
