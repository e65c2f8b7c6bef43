//! The `unwebp watch` command: the conversion loop.

use clap::Args;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use unwebp_core::{Config, WatchSummary, Watcher};

/// Arguments for the `watch` command.
#[derive(Args, Debug, Default)]
pub struct WatchArgs {
    /// Directory to watch (overrides `watch.dir`)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Seconds between scans (overrides `watch.scan_interval_secs`)
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Number of concurrent conversions (overrides `dispatch.max_concurrent_conversions`)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Convert the current backlog once and exit
    #[arg(long)]
    pub once: bool,
}

impl WatchArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.dir {
            config.watch.dir = dir.clone();
        }
        if let Some(interval) = self.interval {
            config.watch.scan_interval_secs = interval;
        }
        if let Some(workers) = self.workers {
            config.dispatch.max_concurrent_conversions = workers;
        }
    }
}

/// Execute the watch command.
pub async fn execute(args: WatchArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    args.apply(&mut config);

    let watcher = Watcher::with_image_codec(config)?;

    let summary = if args.once {
        watcher.run_once().await
    } else {
        let cancel = CancellationToken::new();
        spawn_interrupt_handler(cancel.clone());
        watcher.run(cancel).await
    };

    report(&summary, args.once);

    if summary.abandoned_workers > 0 {
        anyhow::bail!(
            "{} conversion(s) did not finish before the shutdown timeout",
            summary.abandoned_workers
        );
    }
    Ok(())
}

/// Cancel `cancel` on Ctrl-C. Running conversions are allowed to finish.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupt received, finishing running conversions");
                cancel.cancel();
            }
            Err(e) => tracing::error!("Cannot listen for Ctrl-C: {e}"),
        }
    });
}

fn report(summary: &WatchSummary, once: bool) {
    let stats = &summary.stats;
    if once {
        println!(
            "Converted {} file(s), {} failed, {} undecodable removed",
            stats.converted, stats.failed, stats.corrupt_removed
        );
    }
    if stats.unlogged > 0 {
        tracing::warn!(
            "{} conversion(s) could not be written to the ledger and may be repeated",
            stats.unlogged
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        let args = WatchArgs {
            dir: Some(PathBuf::from("/tmp/inbox")),
            interval: Some(2),
            workers: Some(8),
            once: false,
        };
        args.apply(&mut config);

        assert_eq!(config.watch.dir, PathBuf::from("/tmp/inbox"));
        assert_eq!(config.watch.scan_interval_secs, 2);
        assert_eq!(config.dispatch.max_concurrent_conversions, 8);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut config = Config::default();
        WatchArgs::default().apply(&mut config);

        let defaults = Config::default();
        assert_eq!(config.watch.dir, defaults.watch.dir);
        assert_eq!(config.watch.scan_interval_secs, defaults.watch.scan_interval_secs);
    }

    #[tokio::test]
    async fn test_once_with_empty_directory_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("unwebp.toml");
        std::fs::write(&config_file, "").unwrap();

        let args = WatchArgs {
            dir: Some(dir.path().to_path_buf()),
            once: true,
            ..Default::default()
        };
        execute(args, Some(&config_file)).await.unwrap();

        assert!(dir.path().join("converted").is_dir());
        assert!(!dir.path().join("processed_files.log").exists());
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("unwebp.toml");
        std::fs::write(&config_file, "").unwrap();

        let args = WatchArgs {
            dir: Some(dir.path().to_path_buf()),
            workers: Some(0),
            once: true,
            ..Default::default()
        };
        assert!(execute(args, Some(&config_file)).await.is_err());
    }
}
