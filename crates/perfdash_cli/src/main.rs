//! PerfDash CLI
//!
//! Command-line driver for the snapshot write pipeline.
//!
//! # Commands
//!
//! - `plan` - Show how a snapshot file would be split into batches
//! - `write` - Write a snapshot file to an in-memory document store
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use commands::write::WriteArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PerfDash snapshot tools.
#[derive(Parser)]
#[command(name = "perfdash")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the batch plan for a snapshot
    Plan {
        /// Snapshot JSON file
        file: PathBuf,

        /// Maximum operations per batch
        #[arg(short, long, default_value = "50")]
        batch_size: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Write a snapshot to an in-memory store
    Write {
        /// Snapshot JSON file
        file: PathBuf,

        #[command(flatten)]
        args: WriteArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Plan {
            file,
            batch_size,
            format,
        } => {
            commands::plan::run(&file, batch_size, &format)?;
        }
        Commands::Write { file, args, format } => {
            commands::write::run(&file, &args, &format).await?;
        }
        Commands::Version => {
            println!("PerfDash CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("PerfDash Writer v{}", perfdash_writer::VERSION);
        }
    }

    Ok(())
}
