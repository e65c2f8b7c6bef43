//! Directory scanning: finds fresh, unprocessed source files for one tick.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::{DirEntry, WalkDir};

use crate::config::Config;
use crate::error::ScanError;
use crate::ledger::ProcessedSet;
use crate::types::SourceFile;

/// Lists the watched directory and applies the admission filter.
#[derive(Debug, Clone)]
pub struct Scanner {
    dir: PathBuf,
    extension: String,
}

impl Scanner {
    /// Create a scanner for `dir` matching files with `extension` (no dot).
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().to_lowercase(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.watch_dir(), &config.watch.source_extension)
    }

    /// Directory being scanned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a scan using the current local time for the freshness window.
    pub fn scan<'a>(
        &self,
        ledger: &'a ProcessedSet,
        cancel: &'a CancellationToken,
    ) -> Result<Candidates<'a>, ScanError> {
        self.scan_at(ledger, cancel, Local::now())
    }

    /// Start a scan as if the current time were `now`.
    ///
    /// Only opening the directory can fail; entries are read lazily as the
    /// returned iterator is advanced, and unreadable entries are skipped.
    /// Symlinks are followed, so a linked source counts like a plain file.
    pub fn scan_at<'a>(
        &self,
        ledger: &'a ProcessedSet,
        cancel: &'a CancellationToken,
        now: DateTime<Local>,
    ) -> Result<Candidates<'a>, ScanError> {
        // The walker only reports a bad root as its first item.
        std::fs::read_dir(&self.dir).map_err(|e| ScanError::Unreadable {
            path: self.dir.clone(),
            message: e.to_string(),
        })?;

        let entries = WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .into_iter();
        Ok(Candidates {
            entries,
            extension: self.extension.clone(),
            cutoff: admission_cutoff(now),
            ledger,
            cancel,
        })
    }
}

/// Lazy sequence of candidates from a single scan.
///
/// Consumed once; stops early when `cancel` fires.
pub struct Candidates<'a> {
    entries: walkdir::IntoIter,
    extension: String,
    cutoff: DateTime<Local>,
    ledger: &'a ProcessedSet,
    cancel: &'a CancellationToken,
}

impl Candidates<'_> {
    /// Start of the freshness window this scan uses.
    pub fn cutoff(&self) -> DateTime<Local> {
        self.cutoff
    }

    fn admit(&self, entry: DirEntry) -> Option<SourceFile> {
        if !has_extension(entry.path(), &self.extension) {
            return None;
        }

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::debug!(path = %entry.path().display(), "Skipping non-UTF-8 file name");
            return None;
        };

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Cannot stat file, skipping");
                return None;
            }
        };
        if !metadata.is_file() {
            return None;
        }

        let modified: DateTime<Local> = match metadata.modified() {
            Ok(time) => time.into(),
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "No modification time, skipping");
                return None;
            }
        };
        if !is_fresh(modified, self.cutoff) {
            tracing::trace!(file = %name, %modified, "Older than admission window");
            return None;
        }

        if self.ledger.contains(&name) {
            return None;
        }

        Some(SourceFile {
            path: entry.into_path(),
            name,
            modified,
        })
    }
}

impl Iterator for Candidates<'_> {
    type Item = SourceFile;

    fn next(&mut self) -> Option<SourceFile> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot read directory entry");
                    continue;
                }
            };
            if let Some(file) = self.admit(entry) {
                return Some(file);
            }
        }
    }
}

/// Midnight at the start of yesterday, local time.
///
/// The window is calendar based: a scan at 00:05 admits roughly the last 24
/// hours, a scan at 23:55 roughly the last 48.
pub fn admission_cutoff(now: DateTime<Local>) -> DateTime<Local> {
    let yesterday = now
        .date_naive()
        .checked_sub_days(Days::new(1))
        .unwrap_or(NaiveDate::MIN);
    let midnight = yesterday.and_time(NaiveTime::MIN);
    // Local midnight can fall in a DST gap.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| Local.from_utc_datetime(&midnight))
}

/// Whether a file modified at `modified` is inside the window.
pub fn is_fresh(modified: DateTime<Local>, cutoff: DateTime<Local>) -> bool {
    modified > cutoff
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}
