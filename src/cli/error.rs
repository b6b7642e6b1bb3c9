//! CLI error types and conversions

use crate::fetcher::FetchError;
use crate::output::OutputError;
use crate::pipeline::PipelineError;
use crate::resume::ResumeError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Pipeline error
    #[error("{0}")]
    PipelineError(#[from] PipelineError),

    /// Fetch error
    #[error("fetch error: {0}")]
    FetchError(#[from] FetchError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Some partitions did not complete
    #[error("{failed} of {total} partition(s) failed")]
    PartitionsFailed {
        /// Failed partitions
        failed: usize,
        /// Requested partitions
        total: usize,
    },

    /// Invalid checkpoint files were found
    #[error("{0} invalid checkpoint file(s) found; rerun the affected partitions with --no-resume")]
    InvalidCheckpoints(usize),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
