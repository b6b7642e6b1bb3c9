//! Info-sheets subcommand

use crate::info_sheets::{download_info_sheets, InfoSheetSummary};
use crate::pipeline::{Orchestrator, PipelineConfig, PipelineError};
use crate::shutdown::SharedShutdown;
use crate::OpinionType;
use clap::Args;
use tracing::error;

use super::{Cli, CliError, OutputFormat, TypeSelection};

/// Download case information sheets for rows already in `metadata.csv`
#[derive(Debug, Args)]
pub struct InfoSheetsCommand {
    /// Opinion types
    #[command(flatten)]
    pub selection: TypeSelection,

    /// Only rows from these years (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub years: Vec<u16>,

    /// Discard the info-sheet checkpoint and consider every sheet again
    #[arg(long, default_value_t = false)]
    pub no_resume: bool,
}

impl InfoSheetsCommand {
    /// Pipeline configuration for the pass.
    pub fn pipeline_config(&self, cli: &Cli) -> Result<PipelineConfig, CliError> {
        Ok(cli.pipeline_config()?.with_resume(!self.no_resume))
    }

    /// Run one info-sheet pass per selected type, in order.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let orchestrator =
            Orchestrator::from_config(self.pipeline_config(cli)?)?.with_shutdown(shutdown.clone());
        let years = (!self.years.is_empty()).then_some(self.years.as_slice());

        let mut results: Vec<(OpinionType, Result<InfoSheetSummary, PipelineError>)> = Vec::new();
        for opinion_type in self.selection.resolve() {
            if shutdown.is_shutdown_requested() {
                break;
            }
            let result = download_info_sheets(&orchestrator, opinion_type, years).await;
            let fatal = matches!(&result, Err(e) if e.is_run_fatal());
            results.push((opinion_type, result));
            if fatal {
                break;
            }
        }

        for (opinion_type, result) in &results {
            match (cli.output_format, result) {
                (OutputFormat::Json, Ok(summary)) => println!(
                    "{}",
                    serde_json::json!({ "success": true, "summary": summary })
                ),
                (OutputFormat::Json, Err(e)) => println!(
                    "{}",
                    serde_json::json!({
                        "success": false,
                        "opinion_type": opinion_type.key(),
                        "error": e.to_string(),
                    })
                ),
                (OutputFormat::Human, Ok(summary)) => println!(
                    "{}: {} sheets, {} downloaded, {} skipped, {} failed{}",
                    opinion_type.key(),
                    summary.total,
                    summary.downloaded,
                    summary.skipped,
                    summary.failed,
                    if summary.interrupted { " (interrupted)" } else { "" }
                ),
                (OutputFormat::Human, Err(e)) => {
                    eprintln!("{}: failed: {e}", opinion_type.key());
                }
            }
            if let Err(e) = result {
                error!(opinion_type = %opinion_type, error = %e, "Info sheet pass failed");
            }
        }

        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            return Err(CliError::PartitionsFailed {
                failed,
                total: results.len(),
            });
        }
        Ok(())
    }
}
