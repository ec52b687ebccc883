use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rostersync")]
#[command(about = "Inspect and sync the local rostersync store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the JSON config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show schema version and per-table row counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Bring the local schema up to date
    Migrate {
        /// Stop at this schema version
        #[arg(long, value_name = "VERSION")]
        to: Option<u32>,
    },
    /// Push staged writes and pull every collection once
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background until interrupted
    Watch {
        /// Seconds between passes (defaults to the configured interval)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}
