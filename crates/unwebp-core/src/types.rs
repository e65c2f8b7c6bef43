//! Core data types passed between pipeline stages.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::PathBuf;

use crate::error::ConvertError;

/// A candidate found by one directory scan.
///
/// Only lives for the tick that discovered it.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFile {
    /// Full path to the file
    pub path: PathBuf,

    /// File name within the watched directory; the ledger key
    pub name: String,

    /// Last modification time
    pub modified: DateTime<Local>,
}

/// Result of converting one source file.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// Destination written
    Success { source: String, destination: PathBuf },
    /// Nothing recorded; for corrupt input the source has been removed
    Failure { source: String, error: ConvertError },
}

impl ConversionOutcome {
    /// Ledger key of the source this outcome is for.
    pub fn source(&self) -> &str {
        match self {
            ConversionOutcome::Success { source, .. } | ConversionOutcome::Failure { source, .. } => {
                source
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success { .. })
    }
}

/// Counters accumulated by the dispatcher over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Candidates accepted into the queue
    pub submitted: u64,
    /// Conversions that wrote a destination
    pub converted: u64,
    /// Conversions that failed for any reason
    pub failed: u64,
    /// Failed conversions whose corrupt source was removed
    pub corrupt_removed: u64,
    /// Successful conversions whose ledger append failed
    pub unlogged: u64,
}

/// What a finished watch run did.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WatchSummary {
    /// Completed scan ticks
    pub ticks: u64,
    /// Dispatcher totals
    pub stats: DispatchStats,
    /// Workers still running when the shutdown timeout expired
    pub abandoned_workers: usize,
}
