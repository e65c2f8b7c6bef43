//! The `unwebp scan` command: a dry run of the next tick.
//!
//! Reads the ledger and lists candidates without converting anything or
//! creating the output directory.

use clap::Args;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use unwebp_core::{ProcessedSet, Scanner, SourceFile};

/// Arguments for the `scan` command.
#[derive(Args, Debug, Default)]
pub struct ScanArgs {
    /// Directory to scan (overrides `watch.dir`)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Print candidates as JSON
    #[arg(long)]
    pub json: bool,
}

/// Execute the scan command.
pub async fn execute(args: ScanArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(dir) = args.dir {
        config.watch.dir = dir;
    }
    config.validate()?;

    let files = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<SourceFile>> {
        let ledger = ProcessedSet::load(config.ledger_path(), config.ledger.on_malformed)?;
        let scanner = Scanner::from_config(&config);
        let cancel = CancellationToken::new();
        let mut files: Vec<SourceFile> = scanner.scan(&ledger, &cancel)?.collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    })
    .await??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }

    for file in &files {
        println!("{}  {}", file.modified.format("%Y-%m-%d %H:%M:%S"), file.name);
    }
    tracing::info!("{} file(s) would be converted", files.len());
    Ok(())
}
