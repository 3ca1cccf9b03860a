//! tandem CLI - edit sites from the terminal
//!
//! Every edit lands in the local store first; `tandem sync` reconciles it
//! with the server.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::CliContext;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "tandem=info"
                    .parse()
                    .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return commands::completions::run_completions(*shell, output.as_deref());
    }

    let context = CliContext::load(cli.config, cli.data_dir)?;
    match cli.command {
        Commands::Site { command } => commands::site::run_site(command, &context),
        Commands::File { command } => commands::file::run_file(command, &context),
        Commands::Sync {
            watch,
            dry_run,
            json,
        } => commands::sync::run_sync(&context, watch, dry_run, json).await,
        Commands::Config { command } => commands::config::run_config(command, &context),
        Commands::Completions { .. } => Ok(()),
    }
}
