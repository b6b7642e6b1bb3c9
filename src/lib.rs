//! # Court Opinion Archiver Library
//!
//! Retrieves published court opinions (PDF documents) and their case metadata from
//! the Washington State Courts website and keeps a local archive that can be
//! interrupted and resumed at any point without re-fetching completed work.
//!
//! ## Features
//!
//! - **Partitioned crawl**: Supreme Court and the three Court of Appeals publication
//!   statuses are independent partitions with their own output tree
//! - **Case-atomic resume**: a JSON checkpoint is persisted after every case
//! - **Fault tolerant downloads**: retry with exponential backoff, atomic file writes
//! - **Polite by default**: randomized delay before every request
//! - **Append-only metadata**: one CSV row per processed case
//!
//! ## Quick Start
//!
//! ```no_run
//! use court_opinion_archiver::pipeline::{Orchestrator, PipelineConfig};
//! use court_opinion_archiver::OpinionType;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new("./downloads").with_years(vec![2025]);
//! let orchestrator = Orchestrator::from_config(config)?;
//! let report = orchestrator.run(&[OpinionType::SupremeCourt]).await;
//! for partition in &report.partitions {
//!     println!("{}: {:?}", partition.opinion_type, partition.result.is_ok());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - page-fetch capability, retry policy and the reqwest client
//! - [`listing`] - listing parser, year discovery and URL derivation
//! - [`output`] - filesystem layout, filename sanitizer and the metadata sink
//! - [`resume`] - checkpoint store with atomic writes and partition locking
//! - [`downloader`] - document download manager and polite pacing
//! - [`pipeline`] - the orchestrator driving partitions, years and cases
//! - [`info_sheets`] - printer-friendly opinion information sheets

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Document download manager
pub mod downloader;

/// Page fetching and retry
pub mod fetcher;

/// Opinion information sheet downloads
pub mod info_sheets;

/// Listing page parsing and URL derivation
pub mod listing;

/// Metrics collection
pub mod metrics;

/// Output layout, filenames and metadata sink
pub mod output;

/// Crawl orchestration
pub mod pipeline;

/// Checkpoint persistence
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

pub use listing::ListingError;

/// Court level and publication status combination that defines a crawl partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpinionType {
    /// Supreme Court opinions (always published)
    SupremeCourt,
    /// Court of Appeals, published opinions
    AppealsPublished,
    /// Court of Appeals, opinions published in part
    AppealsPartial,
    /// Court of Appeals, unpublished opinions
    AppealsUnpublished,
}

impl OpinionType {
    /// Every partition, in the default processing order.
    pub const ALL: [OpinionType; 4] = [
        OpinionType::SupremeCourt,
        OpinionType::AppealsPublished,
        OpinionType::AppealsPartial,
        OpinionType::AppealsUnpublished,
    ];

    /// Stable key used on the command line and in checkpoint ids.
    pub fn key(&self) -> &'static str {
        match self {
            Self::SupremeCourt => "supreme_court",
            Self::AppealsPublished => "appeals_published",
            Self::AppealsPartial => "appeals_partial",
            Self::AppealsUnpublished => "appeals_unpublished",
        }
    }

    /// Value of the `crtLevel` query parameter.
    pub fn court_level(&self) -> &'static str {
        match self {
            Self::SupremeCourt => "S",
            _ => "A",
        }
    }

    /// Human readable court name written to the metadata sink.
    pub fn court_name(&self) -> &'static str {
        match self {
            Self::SupremeCourt => "Supreme Court",
            _ => "Court of Appeals",
        }
    }

    /// Publication status served by this partition.
    pub fn publication_status(&self) -> PublicationStatus {
        match self {
            Self::SupremeCourt | Self::AppealsPublished => PublicationStatus::Published,
            Self::AppealsPartial => PublicationStatus::PublishedInPart,
            Self::AppealsUnpublished => PublicationStatus::Unpublished,
        }
    }

    /// Folder name under the output root.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::SupremeCourt => "Supreme_Court_Opinions",
            Self::AppealsPublished => "Court_of_Appeals_Published",
            Self::AppealsPartial => "Court_of_Appeals_Published_in_Part",
            Self::AppealsUnpublished => "Court_of_Appeals_Unpublished",
        }
    }

    /// Whether listing rows for this partition are expected to carry a division.
    pub fn expects_division(&self) -> bool {
        !matches!(self, Self::SupremeCourt)
    }
}

impl fmt::Display for OpinionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for OpinionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        OpinionType::ALL
            .into_iter()
            .find(|t| t.key() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown opinion type: {s}. Valid types: {}",
                    OpinionType::ALL.map(|t| t.key()).join(", ")
                )
            })
    }
}

/// Publication status of an opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicationStatus {
    /// Published opinion
    Published,
    /// Published in part
    PublishedInPart,
    /// Unpublished opinion
    Unpublished,
}

impl PublicationStatus {
    /// Value of the `pubStatus` query parameter.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Published => "PUB",
            Self::PublishedInPart => "PAR",
            Self::Unpublished => "UNP",
        }
    }

    /// Label written to the metadata sink.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Published => "Published",
            Self::PublishedInPart => "Published in Part",
            Self::Unpublished => "Unpublished",
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Calendar month, derived from a listing row's file date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Month {
    #[allow(missing_docs)]
    January,
    #[allow(missing_docs)]
    February,
    #[allow(missing_docs)]
    March,
    #[allow(missing_docs)]
    April,
    #[allow(missing_docs)]
    May,
    #[allow(missing_docs)]
    June,
    #[allow(missing_docs)]
    July,
    #[allow(missing_docs)]
    August,
    #[allow(missing_docs)]
    September,
    #[allow(missing_docs)]
    October,
    #[allow(missing_docs)]
    November,
    #[allow(missing_docs)]
    December,
}

impl Month {
    /// All months in calendar order.
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    /// Full English name ("January").
    pub fn name(&self) -> &'static str {
        match self {
            Self::January => "January",
            Self::February => "February",
            Self::March => "March",
            Self::April => "April",
            Self::May => "May",
            Self::June => "June",
            Self::July => "July",
            Self::August => "August",
            Self::September => "September",
            Self::October => "October",
            Self::November => "November",
            Self::December => "December",
        }
    }

    /// Month number, 1-12.
    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    /// Resolve a month token such as `Jan.`, `Sept`, `May` or `January`.
    ///
    /// The token must be a prefix of the full month name with at least three
    /// letters; anything else is rejected.
    pub fn from_token(token: &str) -> Option<Month> {
        let token = token.trim().trim_end_matches('.').to_ascii_lowercase();
        if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Month::ALL
            .into_iter()
            .find(|m| m.name().to_ascii_lowercase().starts_with(&token))
    }

    /// Derive the month from a listing file date like `"Jan. 16, 2025"`.
    ///
    /// Total over the supported format: a date whose leading token is not a
    /// recognised month is an [`ListingError::UnparseableDate`], never a default.
    pub fn from_file_date(file_date: &str) -> Result<Month, ListingError> {
        let token = file_date
            .split(|c: char| c.is_whitespace() || c == ',')
            .find(|part| !part.is_empty())
            .unwrap_or("");
        Month::from_token(token).ok_or_else(|| ListingError::UnparseableDate(file_date.to_string()))
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Court of Appeals division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Division {
    /// Division I
    I,
    /// Division II
    II,
    /// Division III
    III,
}

impl Division {
    /// Roman numeral as printed on the site.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::I => "I",
            Self::II => "II",
            Self::III => "III",
        }
    }
}

impl FromStr for Division {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "I" => Ok(Self::I),
            "II" => Ok(Self::II),
            "III" => Ok(Self::III),
            other => Err(format!("not a division: {other}")),
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a document download.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownloadStatus {
    /// Not attempted yet
    #[default]
    Pending,
    /// Document exists, non-empty, at its final path
    Success,
    /// Download failed with the given reason
    Failed(String),
}

impl DownloadStatus {
    /// Whether the download succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Success => f.write_str("Success"),
            Self::Failed(reason) => write!(f, "Failed: {reason}"),
        }
    }
}

/// One row of a court opinion listing.
///
/// The listing parser fills the listing fields; `document_url`, `local_filename`,
/// `download_status` and `scraped_at` are filled while the case is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Partition the row was listed under
    pub opinion_type: OpinionType,
    /// Publication status of the partition
    pub publication_status: PublicationStatus,
    /// Listing year
    pub year: u16,
    /// Month derived from `file_date`
    pub month: Month,
    /// File date as printed, e.g. "Jan. 16, 2025"
    pub file_date: String,
    /// Docket number, e.g. "102,586-6"
    pub case_number: String,
    /// Division for appellate rows
    pub division: Option<Division>,
    /// Party names
    pub case_title: String,
    /// Description of the filing, e.g. "Majority Opinion"
    pub file_contains: String,
    /// Absolute URL of the case information page
    pub case_info_url: String,
    /// Absolute URL of the PDF document
    pub document_url: Option<String>,
    /// Sanitized document filename
    pub local_filename: Option<String>,
    /// Download outcome
    pub download_status: DownloadStatus,
    /// When the case was processed
    pub scraped_at: Option<DateTime<Utc>>,
}

impl CaseRecord {
    /// Composite identifier used by the checkpoint's handled set.
    pub fn case_id(&self) -> String {
        case_id(self.opinion_type, &self.case_number, &self.case_info_url)
    }
}

/// Build the checkpoint identifier for a case.
///
/// `{partition}:{case_number}:{filename_token}`, or `{partition}:{case_number}`
/// when the case info URL carries no filename token.
pub fn case_id(opinion_type: OpinionType, case_number: &str, case_info_url: &str) -> String {
    match listing::urls::filename_token(case_info_url) {
        Ok(token) => format!("{}:{}:{}", opinion_type.key(), case_number, token),
        Err(_) => format!("{}:{}", opinion_type.key(), case_number),
    }
}
