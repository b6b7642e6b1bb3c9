//! CLI command for listing the years the court site offers

use crate::pipeline::Orchestrator;
use crate::shutdown::SharedShutdown;
use clap::Args;
use serde_json::json;

use super::{Cli, CliError, OutputFormat, TypeSelection};

/// List-years subcommand
#[derive(Debug, Args)]
pub struct ListYearsCommand {
    /// Opinion types
    #[command(flatten)]
    pub selection: TypeSelection,
}

impl ListYearsCommand {
    /// Fetch the year index once per type and print the years found.
    pub async fn execute(&self, cli: &Cli, shutdown: SharedShutdown) -> Result<(), CliError> {
        let orchestrator = Orchestrator::from_config(cli.pipeline_config()?)?.with_shutdown(shutdown);

        let mut all_results = Vec::new();
        for opinion_type in self.selection.resolve() {
            let years = orchestrator.discover_years(opinion_type).await?;
            all_results.push((opinion_type, years));
        }

        match cli.output_format {
            OutputFormat::Json => {
                let output: Vec<_> = all_results
                    .iter()
                    .map(|(t, years)| {
                        json!({
                            "opinion_type": t.key(),
                            "folder": t.folder(),
                            "years": years,
                        })
                    })
                    .collect();
                let text = serde_json::to_string_pretty(&output)
                    .map_err(|e| CliError::ConfigurationError(format!("Failed to serialize years: {e}")))?;
                println!("{text}");
            }
            OutputFormat::Human => {
                for (t, years) in &all_results {
                    let listed: Vec<String> = years.iter().map(u16::to_string).collect();
                    match (years.first(), years.last()) {
                        (Some(newest), Some(oldest)) => println!(
                            "{} ({} years, {newest}-{oldest}): {}",
                            t.key(),
                            years.len(),
                            listed.join(", ")
                        ),
                        _ => println!("{}: no years listed", t.key()),
                    }
                }
            }
        }
        Ok(())
    }
}
