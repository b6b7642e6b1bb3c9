//! Archive layout, document filenames and the metadata sink

pub mod csv;
pub mod path;
pub mod sanitize;

pub use self::csv::{MetadataRow, MetadataSink};
pub use path::PartitionLayout;
pub use sanitize::{document_filename, sanitize_component, sanitize_file_name};

/// Output errors
///
/// Every variant means the archive on disk could not be updated; callers treat
/// them as fatal for the whole run.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Create `dir` and its parents.
pub fn ensure_dir(dir: &std::path::Path) -> OutputResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        OutputError::IoError(format!("Failed to create directory {}: {e}", dir.display()))
    })
}

/// Write `bytes` to `destination` via a temporary sibling and an atomic rename.
///
/// The temporary file is named `.{file_name}.XXXX.part` in the destination
/// directory, so a crash mid-write never leaves a file at `destination`.
pub fn write_atomic(destination: &std::path::Path, bytes: &[u8]) -> OutputResult<()> {
    use std::io::Write;

    let dir = destination
        .parent()
        .ok_or_else(|| OutputError::IoError(format!("{} has no parent", destination.display())))?;
    ensure_dir(dir)?;

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| OutputError::IoError(format!("Failed to create temp file in {}: {e}", dir.display())))?;

    temp.write_all(bytes)
        .map_err(|e| OutputError::IoError(format!("Failed to write temp file: {e}")))?;
    temp.flush()
        .map_err(|e| OutputError::FlushError(format!("Failed to flush temp file: {e}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;
    temp.persist(destination).map_err(|e| {
        OutputError::IoError(format!("Failed to move document to {}: {e}", destination.display()))
    })?;
    Ok(())
}
