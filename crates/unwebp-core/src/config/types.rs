//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Watched directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Directory polled for new source files (non-recursive)
    pub dir: PathBuf,

    /// Seconds to sleep between directory scans
    pub scan_interval_secs: u64,

    /// Extension of source files, without the leading dot
    pub source_extension: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            scan_interval_secs: 10,
            source_extension: "webp".to_string(),
        }
    }
}

/// Converted output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination directory; relative paths resolve against `watch.dir`
    pub dir: PathBuf,

    /// Length of the random alphanumeric destination file stem
    pub name_length: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("converted"),
            name_length: 10,
        }
    }
}

/// What to do with a ledger line that is not `<source> <destination>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedLinePolicy {
    /// Refuse to start with an unknown dedup state
    #[default]
    Abort,
    /// Warn and ignore the line
    Skip,
}

/// Processed-files ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger file; relative paths resolve against `watch.dir`
    pub path: PathBuf,

    /// Handling of malformed lines during replay
    pub on_malformed: MalformedLinePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("processed_files.log"),
            on_malformed: MalformedLinePolicy::Abort,
        }
    }
}

/// Worker pool settings for backpressure and shutdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of conversion workers
    pub max_concurrent_conversions: usize,

    /// Max candidates buffered between the scanner and the workers
    pub queue_capacity: usize,

    /// How long shutdown waits for running conversions
    pub shutdown_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_conversions: 4,
            queue_capacity: 64,
            shutdown_timeout_secs: 30,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
