//! Verify subcommand

use crate::info_sheets::InfoSheetCheckpoint;
use crate::output::PartitionLayout;
use crate::resume::CheckpointState;
use crate::OpinionType;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::{Cli, CliError, OutputFormat};

/// Verify command for checking checkpoint integrity
#[derive(Parser, Debug, Default)]
pub struct VerifyCommand {}

/// Verification result for one checkpoint file
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointReport {
    /// Partition the file belongs to
    pub opinion_type: OpinionType,
    /// Checkpoint file
    pub path: PathBuf,
    /// Whether the file loaded cleanly
    pub valid: bool,
    /// Handled cases or sheets
    pub handled: usize,
    /// Years marked complete
    pub completed_years: Vec<u16>,
    /// Cases remembered as failed
    pub failed_cases: usize,
    /// Why the file is invalid
    pub error: Option<String>,
}

impl VerifyCommand {
    /// Load every checkpoint under the output directory and report on it.
    pub fn execute(&self, cli: &Cli) -> Result<(), CliError> {
        let reports = verify_root(&cli.output_dir);
        if reports.is_empty() {
            println!("No checkpoints found under {}", cli.output_dir.display());
            return Ok(());
        }

        match cli.output_format {
            OutputFormat::Json => {
                let text = serde_json::to_string_pretty(&reports).map_err(|e| {
                    CliError::ConfigurationError(format!("Failed to serialize report: {e}"))
                })?;
                println!("{text}");
            }
            OutputFormat::Human => {
                for report in &reports {
                    if report.valid {
                        println!(
                            "  - {} (valid: {} handled, {} complete years, {} failed)",
                            report.path.display(),
                            report.handled,
                            report.completed_years.len(),
                            report.failed_cases
                        );
                    } else {
                        println!(
                            "  - {} (invalid: {})",
                            report.path.display(),
                            report.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                }
            }
        }

        let invalid = reports.iter().filter(|r| !r.valid).count();
        if invalid > 0 {
            return Err(CliError::InvalidCheckpoints(invalid));
        }
        info!("Verify passed: {} valid checkpoint file(s)", reports.len());
        Ok(())
    }
}

/// Check the case and info-sheet checkpoints of every partition under `root`.
pub fn verify_root(root: &Path) -> Vec<CheckpointReport> {
    let mut reports = Vec::new();
    for opinion_type in OpinionType::ALL {
        let layout = PartitionLayout::new(root, opinion_type);

        let path = layout.checkpoint_path();
        if path.exists() {
            let report = match CheckpointState::load_or_new(&path, opinion_type) {
                Ok(state) => CheckpointReport {
                    opinion_type,
                    path,
                    valid: true,
                    handled: state.handled_count(),
                    completed_years: state.completed_years().iter().rev().copied().collect(),
                    failed_cases: state.failed_cases().len(),
                    error: None,
                },
                Err(e) => invalid(opinion_type, path, e.to_string()),
            };
            reports.push(report);
        }

        let path = layout.info_checkpoint_path();
        if path.exists() {
            let report = match InfoSheetCheckpoint::load_or_new(&path) {
                Ok(checkpoint) => CheckpointReport {
                    opinion_type,
                    path,
                    valid: true,
                    handled: checkpoint.len(),
                    completed_years: Vec::new(),
                    failed_cases: 0,
                    error: None,
                },
                Err(e) => invalid(opinion_type, path, e.to_string()),
            };
            reports.push(report);
        }
    }
    reports
}

fn invalid(opinion_type: OpinionType, path: PathBuf, reason: String) -> CheckpointReport {
    error!(path = %path.display(), error = %reason, "Invalid checkpoint");
    CheckpointReport {
        opinion_type,
        path,
        valid: false,
        handled: 0,
        completed_years: Vec::new(),
        failed_cases: 0,
        error: Some(reason),
    }
}
