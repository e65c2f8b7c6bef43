//! Bounded worker pool running conversions for scanned candidates.
//!
//! The scanner pushes candidates into a bounded queue; a fixed number of
//! workers pull from it. When the queue is full, `submit` waits, which slows
//! the scan down instead of piling up work during a burst of new files.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::converter::Converter;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, LedgerError};
use crate::ledger::ProcessedSet;
use crate::types::{ConversionOutcome, DispatchStats, SourceFile};

/// Create a bounded channel pair with the configured queue capacity.
pub fn bounded_channel<T>(config: &DispatchConfig) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(config.queue_capacity)
}

/// Fixed-size pool of conversion workers.
pub struct Dispatcher {
    tx: mpsc::Sender<SourceFile>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

/// State every worker needs.
struct Shared {
    converter: Arc<Converter>,
    ledger: Arc<ProcessedSet>,
    /// Names queued or converting; a later tick may rediscover them before
    /// their ledger record lands.
    in_flight: Mutex<HashSet<String>>,
    stats: Counters,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    converted: AtomicU64,
    failed: AtomicU64,
    corrupt_removed: AtomicU64,
    unlogged: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            converted: self.converted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            corrupt_removed: self.corrupt_removed.load(Ordering::Relaxed),
            unlogged: self.unlogged.load(Ordering::Relaxed),
        }
    }
}

impl Dispatcher {
    /// Spawn `config.max_concurrent_conversions` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        converter: Arc<Converter>,
        ledger: Arc<ProcessedSet>,
        config: &DispatchConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = bounded_channel(config);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let shared = Arc::new(Shared {
            converter,
            ledger,
            in_flight: Mutex::new(HashSet::new()),
            stats: Counters::default(),
        });

        let workers = (0..config.max_concurrent_conversions)
            .map(|id| {
                let rx = rx.clone();
                let shared = shared.clone();
                let cancel = cancel.clone();
                tokio::spawn(run_worker(id, rx, shared, cancel))
            })
            .collect();

        tracing::debug!(
            workers = config.max_concurrent_conversions,
            queue = config.queue_capacity,
            "Started conversion workers"
        );

        Self {
            tx,
            workers,
            shared,
            cancel,
        }
    }

    /// Queue `file` for conversion.
    ///
    /// Returns `Ok(false)` if a file with the same name is already queued or
    /// converting. Waits while the queue is full; gives up with
    /// [`DispatchError::Cancelled`] if cancellation arrives meanwhile.
    pub async fn submit(&self, file: SourceFile) -> Result<bool, DispatchError> {
        let name = file.name.clone();
        if !self.shared.in_flight().insert(name.clone()) {
            tracing::trace!(file = %name, "Already in flight");
            return Ok(false);
        }

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DispatchError::Cancelled),
            sent = self.tx.send(file) => sent.map_err(|_| DispatchError::Closed),
        };

        match result {
            Ok(()) => {
                self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(file = %name, "Queued for conversion");
                Ok(true)
            }
            Err(e) => {
                self.shared.in_flight().remove(&name);
                Err(e)
            }
        }
    }

    /// Number of files queued or converting right now.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight().len()
    }

    /// Counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.shared.stats.snapshot()
    }

    /// Close the queue and wait up to `timeout` for the workers to finish.
    ///
    /// Without cancellation the workers drain the queue first; after
    /// cancellation they only finish the conversion they are running. Workers
    /// still busy at the deadline are aborted and counted in the returned
    /// `usize`.
    pub async fn shutdown(self, timeout: Duration) -> (DispatchStats, usize) {
        drop(self.tx);

        let deadline = tokio::time::Instant::now() + timeout;
        let mut abandoned = 0;
        for mut handle in self.workers {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Conversion worker panicked: {e}"),
                Err(_) => {
                    handle.abort();
                    abandoned += 1;
                }
            }
        }

        if abandoned > 0 {
            tracing::warn!(
                abandoned,
                timeout_secs = timeout.as_secs(),
                "Shutdown timed out with conversions still running"
            );
        }
        (self.shared.stats.snapshot(), abandoned)
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<SourceFile>>>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                file = rx.recv() => file,
            }
        };
        let Some(file) = next else {
            break;
        };
        shared.process(file).await;
    }
    tracing::trace!(worker = id, "Conversion worker exiting");
}

impl Shared {
    async fn process(&self, file: SourceFile) {
        match self.converter.convert(&file).await {
            ConversionOutcome::Success {
                source,
                destination,
            } => {
                self.stats.converted.fetch_add(1, Ordering::Relaxed);
                let logged = self.converter.ledger_destination(&destination);
                match self.record(&source, &logged).await {
                    Ok(true) => tracing::info!("Converted {} to {}", source, logged),
                    Ok(false) => tracing::warn!(
                        file = %source,
                        destination = %logged,
                        "Converted a file that was already recorded"
                    ),
                    Err(e) => {
                        self.stats.unlogged.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            file = %source,
                            destination = %logged,
                            "Converted but not logged; a restart will convert it again: {e}"
                        );
                    }
                }
            }
            ConversionOutcome::Failure { source, error } => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if error.is_corrupt_input() {
                    self.stats.corrupt_removed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(file = %source, "Failed to convert, source removed: {error}");
                } else {
                    tracing::error!(file = %source, "Failed to convert: {error}");
                }
            }
        }

        // Only after the record is in the ledger, so the next scan skips it.
        self.in_flight().remove(&file.name);
    }

    async fn record(&self, source: &str, destination: &str) -> Result<bool, LedgerError> {
        let ledger = self.ledger.clone();
        let source = source.to_string();
        let destination = destination.to_string();
        match tokio::task::spawn_blocking(move || ledger.record(&source, &destination)).await {
            Ok(result) => result,
            Err(e) => Err(LedgerError::Append {
                path: self.ledger.path().to_path_buf(),
                source: std::io::Error::other(e.to_string()),
            }),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<String>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
