//! AdaptMap CLI
//!
//! Load harness and inspection tools for AdaptMap.
//!
//! # Commands
//!
//! - `load-history` - Append a transaction history and read it back
//! - `inspect` - Load a history and show how each map was segmented

mod commands;

use adaptmap_core::{AdaptiveMapEngine, AddressingMode, MapConfig, DEFAULT_SPLIT_THRESHOLD};
use adaptmap_store::InMemoryStore;
use clap::{Parser, Subcommand};
use commands::history::{HistorySpec, FIRST_DAY_MS};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// AdaptMap command-line tools.
#[derive(Parser)]
#[command(name = "adaptmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Store namespace
    #[arg(global = true, long, default_value = "test")]
    namespace: String,

    /// Store set
    #[arg(global = true, long, default_value = "testAdapt")]
    set: String,

    /// Bin holding map entries
    #[arg(global = true, long, default_value = "mapBin")]
    bin: String,

    /// Entries per segment before it splits
    #[arg(global = true, long, default_value_t = DEFAULT_SPLIT_THRESHOLD)]
    split_size: usize,

    /// Address segments by digest instead of readable keys
    #[arg(global = true, long)]
    digest: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append a transaction history and read it back
    LoadHistory {
        #[command(flatten)]
        history: HistoryArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load a history and show the segments of each day
    Inspect {
        #[command(flatten)]
        history: HistoryArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(clap::Args)]
struct HistoryArgs {
    /// Number of days to load
    #[arg(short, long, default_value = "29")]
    days: u32,

    /// Transactions per day, one per second
    #[arg(short, long, default_value = "1000")]
    per_day: u32,

    /// Customer part of every base key
    #[arg(short, long, default_value = "12345")]
    customer: String,

    /// Epoch milliseconds of the first day
    #[arg(long, default_value_t = FIRST_DAY_MS)]
    start: i64,
}

impl From<HistoryArgs> for HistorySpec {
    fn from(args: HistoryArgs) -> Self {
        Self {
            customer: args.customer,
            first_day_ms: args.start,
            days: args.days,
            per_day: args.per_day,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = MapConfig::new(&cli.namespace, &cli.set, &cli.bin)
        .with_split_threshold(cli.split_size)
        .with_addressing(if cli.digest {
            AddressingMode::DigestKey
        } else {
            AddressingMode::ValueKey
        });

    match cli.command {
        Commands::LoadHistory { history, format } => {
            let engine = AdaptiveMapEngine::new(Arc::new(InMemoryStore::new()), config)?;
            commands::load::run(&engine, &history.into(), &format)?;
        }
        Commands::Inspect { history, format } => {
            let engine = AdaptiveMapEngine::new(Arc::new(InMemoryStore::new()), config)?;
            commands::inspect::run(&engine, &history.into(), &format)?;
        }
        Commands::Version => {
            println!("AdaptMap CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("AdaptMap Core v{}", adaptmap_core::VERSION);
        }
    }

    Ok(())
}
