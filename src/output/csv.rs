//! Append-only CSV metadata sink
//!
//! One row per processed case. The header is written only when the file is
//! created; later runs append below the existing rows and never rewrite them.

use super::{OutputError, OutputResult};
use crate::CaseRecord;
use csv::{Writer, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Column order of the metadata file.
pub const METADATA_COLUMNS: [&str; 14] = [
    "opinion_type",
    "publication_status",
    "year",
    "month",
    "file_date",
    "case_number",
    "division",
    "case_title",
    "file_contains",
    "case_info_url",
    "pdf_url",
    "pdf_filename",
    "download_status",
    "scraped_at",
];

/// CSV record for one processed case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    /// "Supreme Court" or "Court of Appeals"
    pub opinion_type: String,
    /// "Published", "Published in Part" or "Unpublished"
    pub publication_status: String,
    /// Listing year
    pub year: u16,
    /// Full month name
    pub month: String,
    /// File date as printed on the site
    pub file_date: String,
    /// Docket number
    pub case_number: String,
    /// Division, empty for Supreme Court rows
    pub division: String,
    /// Party names
    pub case_title: String,
    /// Filing description
    pub file_contains: String,
    /// Case information page
    pub case_info_url: String,
    /// Derived PDF URL, empty when it could not be derived
    pub pdf_url: String,
    /// Document file name, empty when it could not be derived
    pub pdf_filename: String,
    /// "Success" or "Failed: reason"
    pub download_status: String,
    /// RFC 3339 processing time
    pub scraped_at: String,
}

impl From<&CaseRecord> for MetadataRow {
    fn from(record: &CaseRecord) -> Self {
        Self {
            opinion_type: record.opinion_type.court_name().to_string(),
            publication_status: record.publication_status.label().to_string(),
            year: record.year,
            month: record.month.name().to_string(),
            file_date: record.file_date.clone(),
            case_number: record.case_number.clone(),
            division: record
                .division
                .map(|d| d.as_str().to_string())
                .unwrap_or_default(),
            case_title: record.case_title.clone(),
            file_contains: record.file_contains.clone(),
            case_info_url: record.case_info_url.clone(),
            pdf_url: record.document_url.clone().unwrap_or_default(),
            pdf_filename: record.local_filename.clone().unwrap_or_default(),
            download_status: record.download_status.to_string(),
            scraped_at: record
                .scraped_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

/// Single-writer append sink for a partition's `metadata.csv`.
pub struct MetadataSink {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
}

impl MetadataSink {
    /// Open `path` for appending, writing the header if the file is new or empty.
    pub fn open<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            super::ensure_dir(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                OutputError::IoError(format!("Failed to open {}: {e}", path.display()))
            })?;
        let existing_len = file
            .metadata()
            .map_err(|e| OutputError::IoError(format!("Failed to stat {}: {e}", path.display())))?
            .len();

        // A crash mid-row leaves no trailing newline; start the next row on its own line.
        if existing_len > 0 && !ends_with_newline(&mut file)? {
            warn!(path = %path.display(), "Metadata file ends mid-row, terminating it");
            file.write_all(b"\n")
                .map_err(|e| OutputError::IoError(format!("Failed to repair row: {e}")))?;
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));

        if existing_len == 0 {
            writer
                .write_record(METADATA_COLUMNS)
                .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
            debug!(path = %path.display(), "Created metadata file with header");
        } else {
            debug!(path = %path.display(), bytes = existing_len, "Appending to existing metadata file");
        }

        let mut sink = Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        };
        sink.flush()?;
        Ok(sink)
    }

    /// Append one row and force it to disk.
    pub fn append(&mut self, record: &CaseRecord) -> OutputResult<()> {
        self.writer
            .serialize(MetadataRow::from(record))
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        self.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    /// Rows appended through this sink.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
        self.writer
            .get_ref()
            .get_ref()
            .sync_data()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))
    }

    /// Flush and close the sink.
    pub fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        info!(
            path = %self.path.display(),
            rows = self.rows_written,
            "Metadata sink closed"
        );
        Ok(())
    }
}

fn ends_with_newline(file: &mut File) -> OutputResult<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))
        .and_then(|_| file.read_exact(&mut last))
        .map_err(|e| OutputError::IoError(format!("Failed to read metadata tail: {e}")))?;
    Ok(last[0] == b'\n')
}

/// Read every well-formed row of a metadata file. A missing file has no rows.
pub fn read_rows<P: AsRef<Path>>(path: P) -> OutputResult<Vec<MetadataRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| OutputError::CsvError(format!("Failed to open {}: {e}", path.display())))?;

    let mut rows = Vec::new();
    for (line, result) in reader.deserialize::<MetadataRow>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => warn!(path = %path.display(), line = line + 2, error = %e, "Skipping unreadable metadata row"),
        }
    }
    Ok(rows)
}
