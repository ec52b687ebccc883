//! rostersync CLI - inspect, migrate and sync the local store
//!
//! Reads an optional JSON config file, opens the local database (running
//! migrations) and talks to the configured HTTP remote.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::Context;
use crate::commands::migrate::run_migrate;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
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

    let directive = "rostersync=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();
    let context = Context::load(cli.config, cli.db_path)?;

    match cli.command {
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Migrate { to } => run_migrate(&context, to).await?,
        Commands::Sync { json } => run_sync(&context, json).await?,
        Commands::Watch { interval } => run_watch(&context, interval).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests;
