//! Archive directory layout
//!
//! ```text
//! {root}/{Opinion_Type_Folder}/
//!     metadata.csv
//!     checkpoint.json
//!     info_sheet_checkpoint.json
//!     {year}/{Month}/{case_number}_{case_title}.pdf
//! ```
//!
//! # Usage Example
//!
//! ```rust
//! use court_opinion_archiver::output::PartitionLayout;
//! use court_opinion_archiver::{Month, OpinionType};
//! use std::path::PathBuf;
//!
//! let layout = PartitionLayout::new("downloads", OpinionType::SupremeCourt);
//! let path = layout.document_path(2025, Month::January, "102,586-6_State v. Smith.pdf");
//! assert_eq!(
//!     path,
//!     PathBuf::from("downloads/Supreme_Court_Opinions/2025/January/102,586-6_State v. Smith.pdf")
//! );
//! ```

use crate::{Month, OpinionType};
use std::path::{Path, PathBuf};

/// Metadata sink file name
pub const METADATA_FILE: &str = "metadata.csv";
/// Pipeline checkpoint file name
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
/// Info sheet checkpoint file name
pub const INFO_CHECKPOINT_FILE: &str = "info_sheet_checkpoint.json";
/// File held locked while a process works a partition
pub const PARTITION_LOCK_FILE: &str = ".archiver.lock";

/// Paths of one partition's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLayout {
    root: PathBuf,
    opinion_type: OpinionType,
}

impl PartitionLayout {
    /// Layout for `opinion_type` under `root`.
    pub fn new(root: impl Into<PathBuf>, opinion_type: OpinionType) -> Self {
        Self {
            root: root.into(),
            opinion_type,
        }
    }

    /// Partition this layout describes.
    pub fn opinion_type(&self) -> OpinionType {
        self.opinion_type
    }

    /// Output root shared by all partitions.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/{folder}`
    pub fn partition_dir(&self) -> PathBuf {
        self.root.join(self.opinion_type.folder())
    }

    /// `{root}/{folder}/{year}/{Month}`
    pub fn month_dir(&self, year: u16, month: Month) -> PathBuf {
        self.partition_dir()
            .join(year.to_string())
            .join(month.name())
    }

    /// Final path of a document.
    pub fn document_path(&self, year: u16, month: Month, file_name: &str) -> PathBuf {
        self.month_dir(year, month).join(file_name)
    }

    /// Metadata sink of the partition.
    pub fn metadata_path(&self) -> PathBuf {
        self.partition_dir().join(METADATA_FILE)
    }

    /// Pipeline checkpoint of the partition.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.partition_dir().join(CHECKPOINT_FILE)
    }

    /// Info sheet checkpoint of the partition.
    pub fn info_checkpoint_path(&self) -> PathBuf {
        self.partition_dir().join(INFO_CHECKPOINT_FILE)
    }

    /// Lock file guarding the partition against a second process.
    pub fn lock_path(&self) -> PathBuf {
        self.partition_dir().join(PARTITION_LOCK_FILE)
    }
}
