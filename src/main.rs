//! Pipeliner - Main Entry Point

use clap::Parser;
use kolosal_pipeliner::cli::{cmd_plan, cmd_run, Cli, Commands};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_pipeliner=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { config } => {
            cmd_plan(&config)?;
        }
        Commands::Run { config, data, target, log, collect_n, continue_on_error, n_jobs } => {
            cmd_run(&config, &data, &target, &log, collect_n, continue_on_error, n_jobs)?;
        }
    }

    Ok(())
}
