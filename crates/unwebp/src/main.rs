//! unwebp CLI - watch a directory and convert new WebP images to PNG.
//!
//! Each source file is converted at most once; completed conversions are
//! kept in a ledger file so restarts pick up where the last run stopped.
//!
//! # Usage
//!
//! ```bash
//! # Watch the current directory (same as `unwebp watch`)
//! unwebp
//!
//! # Watch another directory, scanning every 30 seconds
//! unwebp watch --dir ~/Downloads --interval 30
//!
//! # Show what the next scan would convert
//! unwebp scan
//!
//! # List completed conversions
//! unwebp ledger
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// unwebp - convert new WebP images to PNG exactly once.
#[derive(Parser, Debug)]
#[command(name = "unwebp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true, env = "UNWEBP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch a directory and convert new files (default)
    Watch(cli::watch::WatchArgs),

    /// List the files the next scan would convert, without converting them
    Scan(cli::scan::ScanArgs),

    /// Show completed conversions from the ledger
    Ledger(cli::ledger::LedgerArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default logging settings. Check your config file with `unwebp config path`."
            );
            unwebp_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("unwebp v{}", unwebp_core::VERSION);

    let config_path = cli.config.as_deref();
    match cli.command {
        None => cli::watch::execute(cli::watch::WatchArgs::default(), config_path).await,
        Some(Commands::Watch(args)) => cli::watch::execute(args, config_path).await,
        Some(Commands::Scan(args)) => cli::scan::execute(args, config_path).await,
        Some(Commands::Ledger(args)) => cli::ledger::execute(args, config_path).await,
        Some(Commands::Config(args)) => cli::config::execute(args, config_path).await,
    }
}
