//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod init;
mod migrate;
mod reset;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::helpers::parse_entity;
use crate::config::{load_settings_with_options, LoadOptions};
use crate::models::EntityType;

#[derive(Parser)]
#[command(name = "contentmigrate")]
#[command(about = "Resumable content migration from a paginated CMS API")]
#[command(version)]
pub struct Cli {
    /// Data directory holding the database, checkpoint and uploads
    /// (overrides config file).
    #[arg(long, short = 't', global = true)]
    target: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and destination schema
    Init,

    /// Run or resume the migration
    Migrate {
        /// Stop after importing this many posts (resumable)
        max_posts: Option<u64>,
        /// Records of a page imported concurrently
        #[arg(short, long)]
        workers: Option<usize>,
        /// Only migrate these entity types (repeatable)
        #[arg(long, value_parser = parse_entity)]
        only: Vec<EntityType>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show checkpoint progress and destination row counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget checkpoint progress so entity types are fetched again
    Reset {
        /// Entity types to reset
        #[arg(value_parser = parse_entity)]
        entities: Vec<EntityType>,
        /// Reset every entity type and pending URL mappings
        #[arg(long)]
        all: bool,
        /// Clear the recorded error log
        #[arg(long)]
        errors: bool,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data_dir: cli.target,
    };
    let (settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings, &config).await,
        Commands::Migrate {
            max_posts,
            workers,
            only,
            json,
        } => migrate::cmd_migrate(&settings, max_posts, workers, only, json).await,
        Commands::Status { json } => status::cmd_status(&settings, json).await,
        Commands::Reset {
            entities,
            all,
            errors,
        } => reset::cmd_reset(&settings, &entities, all, errors).await,
    }
}
