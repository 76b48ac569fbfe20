//! LexSync CLI
//!
//! Command-line tools for the offline sync queue log.
//!
//! # Commands
//!
//! - `inspect` - Record counts per entity class and state
//! - `verify` - Check every log entry and report damage
//! - `compact` - Rewrite the log, optionally pruning synced records
//! - `dump` - List queued records

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// LexSync queue maintenance tools.
#[derive(Parser)]
#[command(name = "lexsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the queue log file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show record counts per entity class and state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify log integrity
    Verify,

    /// Rewrite the log without superseded entries
    Compact {
        /// Prune every synced record
        #[arg(long)]
        prune_synced: bool,

        /// Prune synced records acknowledged more than this many seconds ago
        #[arg(long)]
        older_than_secs: Option<u64>,

        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// List queued records
    Dump {
        /// Only records of this entity class
        #[arg(short, long)]
        class: Option<String>,

        /// Maximum number of records to list
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Queue log path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Queue log path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::Compact {
            prune_synced,
            older_than_secs,
            dry_run,
        } => {
            let path = cli.path.ok_or("Queue log path required for compact")?;
            let policy = commands::compact::policy_from_flags(prune_synced, older_than_secs);
            commands::compact::run(&path, policy, dry_run)?;
        }
        Commands::Dump {
            class,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Queue log path required for dump")?;
            commands::dump::run(&path, class.as_deref(), limit, &format)?;
        }
        Commands::Version => {
            println!("LexSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Queue log format v{}",
                lexsync_queue::log::LOG_VERSION
            );
        }
    }

    Ok(())
}
