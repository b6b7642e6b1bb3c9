//! Checkpoint persistence
//!
//! One [`CheckpointState`] per partition, rewritten after every processed case
//! with write-to-temp, fsync and atomic rename under an advisory file lock.

use crate::listing::ListingPosition;
use crate::{DownloadStatus, Month, OpinionType};
use fd_lock::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current checkpoint schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed state file size (10 MB) to prevent memory exhaustion
pub const MAX_STATE_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Resumable progress of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    schema_version: String,
    partition: OpinionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_month_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_month: Option<Month>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_case_index: Option<u32>,
    #[serde(default)]
    handled_case_ids: BTreeSet<String>,
    #[serde(default)]
    completed_years: BTreeSet<u16>,
    #[serde(default)]
    failed_cases: BTreeMap<String, u16>,
    created_at: i64,
    updated_at: i64,
}

impl CheckpointState {
    /// Empty checkpoint for a partition's first run.
    pub fn new(partition: OpinionType) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            partition,
            last_year: None,
            last_month_index: None,
            last_month: None,
            last_case_index: None,
            handled_case_ids: BTreeSet::new(),
            completed_years: BTreeSet::new(),
            failed_cases: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Partition this checkpoint belongs to.
    pub fn partition(&self) -> OpinionType {
        self.partition
    }

    /// Furthest case processed in listing order, if any.
    pub fn position(&self) -> Option<ListingPosition> {
        Some(ListingPosition {
            year: self.last_year?,
            month_index: self.last_month_index?,
            case_index: self.last_case_index?,
        })
    }

    /// Month of the furthest processed case.
    pub fn last_month(&self) -> Option<Month> {
        self.last_month
    }

    /// Whether `case_id` has been processed before.
    pub fn is_handled(&self, case_id: &str) -> bool {
        self.handled_case_ids.contains(case_id)
    }

    /// Number of processed cases.
    pub fn handled_count(&self) -> usize {
        self.handled_case_ids.len()
    }

    /// Whether every case of `year` was processed.
    pub fn is_year_completed(&self, year: u16) -> bool {
        self.completed_years.contains(&year)
    }

    /// Years marked complete.
    pub fn completed_years(&self) -> &BTreeSet<u16> {
        &self.completed_years
    }

    /// Cases whose last attempt failed, with their year.
    pub fn failed_cases(&self) -> &BTreeMap<String, u16> {
        &self.failed_cases
    }

    /// Whether `case_id` is remembered as failed.
    pub fn is_failed(&self, case_id: &str) -> bool {
        self.failed_cases.contains_key(case_id)
    }

    /// Years that still hold failed cases.
    pub fn years_with_failures(&self) -> BTreeSet<u16> {
        self.failed_cases.values().copied().collect()
    }

    /// Record a processed case.
    ///
    /// The listing position only moves forward. Years are walked most recent
    /// first, so an older year or a later case of the same year advances it;
    /// anything else (a retried case) leaves it untouched.
    pub fn record_case(
        &mut self,
        case_id: &str,
        position: ListingPosition,
        month: Month,
        status: &DownloadStatus,
    ) {
        self.handled_case_ids.insert(case_id.to_string());
        match status {
            DownloadStatus::Failed(_) => {
                self.failed_cases.insert(case_id.to_string(), position.year);
            }
            _ => {
                self.failed_cases.remove(case_id);
            }
        }

        if self.is_ahead(position) {
            self.last_year = Some(position.year);
            self.last_month_index = Some(position.month_index);
            self.last_month = Some(month);
            self.last_case_index = Some(position.case_index);
        }
        self.touch();
    }

    /// Apply a row already present in the metadata file.
    ///
    /// Covers the window between appending a row and saving the checkpoint.
    /// Rows must be applied in file order; the position is left untouched.
    /// Returns whether anything changed.
    pub fn reconcile(&mut self, case_id: &str, year: u16, failed: bool) -> bool {
        let newly_handled = self.handled_case_ids.insert(case_id.to_string());
        let changed = if failed {
            newly_handled && self.failed_cases.insert(case_id.to_string(), year).is_none()
        } else {
            self.failed_cases.remove(case_id).is_some() || newly_handled
        };
        if changed {
            self.touch();
        }
        changed
    }

    /// Mark every case of `year` processed.
    pub fn complete_year(&mut self, year: u16) {
        if self.completed_years.insert(year) {
            debug!(year, partition = %self.partition, "Year completed");
            self.touch();
        }
    }

    fn is_ahead(&self, position: ListingPosition) -> bool {
        match self.position() {
            None => true,
            Some(current) if position.year == current.year => !position.covered_by(Some(current)),
            Some(current) => position.year < current.year,
        }
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    /// Save state to file with atomic writes and file locking
    pub fn save(&self, path: &Path) -> Result<(), ResumeError> {
        save_json(path, self)?;
        debug!(
            path = %path.display(),
            handled = self.handled_case_ids.len(),
            last_year = ?self.last_year,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load state from file with locking
    pub fn load(path: &Path) -> Result<Self, ResumeError> {
        let state: CheckpointState = load_json(path)?;
        if state.schema_version != SCHEMA_VERSION {
            warn!(
                found_version = %state.schema_version,
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch"
            );
            return Err(ResumeError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: state.schema_version,
            });
        }
        info!(
            path = %path.display(),
            handled = state.handled_case_ids.len(),
            completed_years = state.completed_years.len(),
            failed = state.failed_cases.len(),
            "Checkpoint loaded"
        );
        Ok(state)
    }

    /// Load the checkpoint for `partition`, or start empty when none exists.
    pub fn load_or_new(path: &Path, partition: OpinionType) -> Result<Self, ResumeError> {
        if !path.exists() {
            debug!(path = %path.display(), "No checkpoint, starting fresh");
            return Ok(Self::new(partition));
        }
        let state = Self::load(path)?;
        if state.partition != partition {
            return Err(ResumeError::PartitionMismatch {
                expected: partition.key().to_string(),
                found: state.partition.key().to_string(),
            });
        }
        Ok(state)
    }
}

/// Serialize `value` to `path` atomically.
///
/// Uses tempfile::NamedTempFile for the write and an fd-lock on `{path}.lock`
/// so readers never observe a partial file.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ResumeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

    let lock_path = path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;
    let mut lock = RwLock::new(lock_file);
    let _guard = lock
        .write()
        .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
        .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;
    temp_file
        .write_all(json.as_bytes())
        .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
    temp_file
        .flush()
        .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp_file
        .persist(path)
        .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

    // Fsync parent directory so the rename is durable
    if let Ok(dir) = std::fs::File::open(parent_dir) {
        let _ = dir.sync_all();
    }
    Ok(())
}

/// Read and deserialize `path` under a shared lock.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ResumeError> {
    let lock_path = path.with_extension("lock");
    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))?;
    let lock = RwLock::new(lock_file);
    let _guard = lock
        .read()
        .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

    let metadata = std::fs::metadata(path).map_err(|e| ResumeError::Unreadable(e.to_string()))?;
    if metadata.len() > MAX_STATE_FILE_SIZE {
        return Err(ResumeError::StateTooLarge {
            size: metadata.len(),
            max: MAX_STATE_FILE_SIZE,
        });
    }

    let contents =
        std::fs::read_to_string(path).map_err(|e| ResumeError::Unreadable(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to deserialize state file");
        ResumeError::DeserializationError(e.to_string())
    })
}

/// Errors related to checkpoint state
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Schema version mismatch
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version
        expected: String,
        /// Found schema version
        found: String,
    },

    /// Checkpoint written for another partition
    #[error("checkpoint belongs to partition {found}, expected {expected}")]
    PartitionMismatch {
        /// Partition being processed
        expected: String,
        /// Partition recorded in the file
        found: String,
    },

    /// State file too large
    #[error("state file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Existing state file could not be read
    #[error("state file unreadable: {0}")]
    Unreadable(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),

    /// Partition already being processed by another process
    #[error("partition is locked by another process: {0}")]
    Locked(String),
}

impl ResumeError {
    /// Whether the error means an existing state file cannot be trusted.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::SchemaVersionMismatch { .. }
                | Self::PartitionMismatch { .. }
                | Self::StateTooLarge { .. }
                | Self::Unreadable(_)
                | Self::DeserializationError(_)
        )
    }
}
