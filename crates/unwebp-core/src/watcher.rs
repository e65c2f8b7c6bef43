//! Top-level watch loop: scan, dispatch, sleep, until cancelled.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::codec::{Codec, ImageCodec};
use crate::config::Config;
use crate::error::{ConfigError, DispatchError, Result, ScanError};
use crate::ledger::ProcessedSet;
use crate::pipeline::{Converter, Dispatcher, Scanner};
use crate::types::{SourceFile, WatchSummary};

/// Where the watch loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Scanning,
    Dispatching,
    Sleeping,
    Stopping,
    Terminated,
}

/// Owns the ledger, scanner and converter for one watched directory.
pub struct Watcher {
    config: Config,
    ledger: Arc<ProcessedSet>,
    scanner: Scanner,
    converter: Arc<Converter>,
    state: watch::Sender<WatcherState>,
}

impl Watcher {
    /// Prepare to watch `config.watch.dir`.
    ///
    /// Creates the output directory if needed and replays the ledger. A ledger
    /// that cannot be read (or is malformed, under the default policy) is
    /// fatal: running with an unknown dedup state could convert files twice.
    pub fn new(config: Config, codec: Arc<dyn Codec>) -> Result<Self> {
        config.validate()?;

        let output_dir = config.output_dir();
        create_output_dir(&output_dir)?;

        let ledger = ProcessedSet::load(config.ledger_path(), config.ledger.on_malformed)?;
        tracing::info!(
            ledger = %ledger.path().display(),
            entries = ledger.len(),
            "Loaded processed-files ledger"
        );

        let scanner = Scanner::from_config(&config);
        let converter = Converter::from_config(codec, &config);

        Ok(Self {
            config,
            ledger: Arc::new(ledger),
            scanner,
            converter: Arc::new(converter),
            state: watch::Sender::new(WatcherState::Idle),
        })
    }

    /// Watcher decoding `watch.source_extension` with the `image` crate.
    pub fn with_image_codec(config: Config) -> Result<Self> {
        let codec = ImageCodec::for_extension(&config.watch.source_extension).ok_or_else(|| {
            ConfigError::ValidationError(format!(
                "no decoder available for .{} files",
                config.watch.source_extension
            ))
        })?;
        Self::new(config, Arc::new(codec))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ProcessedSet> {
        &self.ledger
    }

    /// Current position in the tick loop.
    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Follow state changes, including after `run` has taken the watcher.
    pub fn subscribe(&self) -> watch::Receiver<WatcherState> {
        self.state.subscribe()
    }

    /// Candidates the next tick would convert, without converting anything.
    pub async fn candidates(&self) -> std::result::Result<Vec<SourceFile>, ScanError> {
        self.list(&CancellationToken::new()).await
    }

    /// Run until `cancel` fires, then wait (bounded) for running conversions.
    pub async fn run(self, cancel: CancellationToken) -> WatchSummary {
        self.run_ticks(cancel, None).await
    }

    /// Run a single tick and wait for all of its conversions.
    pub async fn run_once(self) -> WatchSummary {
        self.run_ticks(CancellationToken::new(), Some(1)).await
    }

    async fn run_ticks(self, cancel: CancellationToken, max_ticks: Option<u64>) -> WatchSummary {
        let dispatcher = Dispatcher::start(
            self.converter.clone(),
            self.ledger.clone(),
            &self.config.dispatch,
            cancel.clone(),
        );
        let interval = Duration::from_secs(self.config.watch.scan_interval_secs);

        tracing::info!(
            dir = %self.scanner.dir().display(),
            output = %self.converter.output_dir().display(),
            "Watching for .{} files every {}s",
            self.config.watch.source_extension,
            interval.as_secs()
        );

        let mut ticks = 0u64;
        while !cancel.is_cancelled() {
            let submitted = self.tick(&dispatcher, &cancel).await;
            ticks += 1;
            if submitted > 0 {
                tracing::debug!(tick = ticks, submitted, "Tick dispatched");
            }

            if max_ticks.is_some_and(|max| ticks >= max) {
                break;
            }

            self.transition(WatcherState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = cancel.cancelled() => {}
            }
        }

        self.transition(WatcherState::Stopping);
        let timeout = Duration::from_secs(self.config.dispatch.shutdown_timeout_secs);
        let (stats, abandoned_workers) = dispatcher.shutdown(timeout).await;
        self.transition(WatcherState::Terminated);

        tracing::info!(
            ticks,
            converted = stats.converted,
            failed = stats.failed,
            corrupt_removed = stats.corrupt_removed,
            unlogged = stats.unlogged,
            "Watcher stopped"
        );

        WatchSummary {
            ticks,
            stats,
            abandoned_workers,
        }
    }

    /// Scan once and queue every candidate. Returns how many were queued.
    async fn tick(&self, dispatcher: &Dispatcher, cancel: &CancellationToken) -> usize {
        self.transition(WatcherState::Scanning);
        let candidates = match self.list(cancel).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Skipping tick: {e}");
                return 0;
            }
        };

        self.transition(WatcherState::Dispatching);
        let mut submitted = 0;
        for file in candidates {
            match dispatcher.submit(file).await {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(DispatchError::Cancelled) => break,
                Err(e) => {
                    tracing::error!("Cannot queue conversions: {e}");
                    break;
                }
            }
        }
        submitted
    }

    /// List candidates on the blocking pool: directory reads and ledger
    /// lookups can both stall for the length of a disk sync.
    async fn list(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<SourceFile>, ScanError> {
        let scanner = self.scanner.clone();
        let ledger = self.ledger.clone();
        let cancel = cancel.clone();
        let listing = tokio::task::spawn_blocking(move || {
            scanner
                .scan(&ledger, &cancel)
                .map(|candidates| candidates.collect::<Vec<_>>())
        });
        match listing.await {
            Ok(result) => result,
            Err(e) => Err(ScanError::Unreadable {
                path: self.scanner.dir().to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    fn transition(&self, next: WatcherState) {
        let previous = self.state.send_replace(next);
        tracing::trace!(from = ?previous, to = ?next, "Watcher state");
    }
}

/// Create the output directory (owner-only on Unix) if it does not exist.
fn create_output_dir(path: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}
