//! cityfeeds — per-city transit feed catalog maintenance.
//!
//! # Usage
//!
//! ```text
//! cityfeeds sync <city-dir>... [--jobs N] [--no-build]
//! cityfeeds sync --all --cities-dir <dir> [--jobs N] [--no-build]
//! cityfeeds new <cityid> --name <name> --lng <lng> --lat <lat> [--location <id>] --cities-dir <dir>
//! cityfeeds status <city-dir>... [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{new::NewArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "cityfeeds",
    version,
    about = "Fetch, cache and rebuild per-city transit feeds",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch changed feeds, rewrite records and rebuild artifacts.
    Sync(SyncArgs),

    /// Create a new city record.
    New(NewArgs),

    /// Show cache age and hash agreement per feed, without network access.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run(),
        Commands::New(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
