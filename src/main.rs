//! Main entry point for the court-opinion-archiver CLI

use anyhow::Context;
use clap::Parser;
use court_opinion_archiver::cli::{Cli, Commands};
use court_opinion_archiver::metrics;
use court_opinion_archiver::shutdown::{self, ShutdownCoordinator};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("court_opinion_archiver=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    if let Some(addr) = cli.metrics_addr {
        metrics::init_metrics(addr)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Failed to start metrics exporter on {addr}"))?;
    }

    // Install global shutdown coordinator and signal handler
    let shutdown = ShutdownCoordinator::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    shutdown::install_signal_handler(shutdown.clone());

    match &cli.command {
        Commands::Scrape(args) => args.execute(cli, shutdown.clone()).await?,
        Commands::ListYears(cmd) => cmd.execute(cli, shutdown.clone()).await?,
        Commands::InfoSheets(cmd) => cmd.execute(cli, shutdown.clone()).await?,
        Commands::Verify(cmd) => cmd.execute(cli)?,
    }

    if shutdown.is_shutdown_requested() {
        warn!("Stopped on shutdown request; progress is saved, rerun to resume");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
