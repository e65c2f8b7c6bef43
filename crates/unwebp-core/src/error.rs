//! Error types for the unwebp watch-and-convert pipeline.
//!
//! Errors are organized by component so log lines carry the file, ledger line
//! or setting that caused them.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for unwebp operations.
#[derive(Error, Debug)]
pub enum UnwebpError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Processed-files ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Directory scan errors
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// Worker pool errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors reading or appending to the processed-files ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The ledger file exists but could not be read
    #[error("Cannot read ledger {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Appending a record failed (the entry is still held in memory)
    #[error("Cannot append to ledger {path}: {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A ledger line is not `<source> <destination>`
    #[error("Malformed ledger line {line} in {path}: {content:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// A record field cannot be represented in the line format
    #[error("Cannot log {field} {value:?}: fields must be non-empty and contain no whitespace")]
    InvalidField { field: &'static str, value: String },
}

/// Per-file conversion errors.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Source could not be read (left in place, retried next tick)
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Source bytes do not decode (source is removed)
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Destination could not be written (source left in place)
    #[error("Encode error for {path} -> {destination}: {message}")]
    Encode {
        path: PathBuf,
        destination: PathBuf,
        message: String,
    },

    /// A blocking codec task panicked or was cancelled
    #[error("Conversion task for {path} failed: {message}")]
    Task { path: PathBuf, message: String },
}

impl ConvertError {
    /// Whether the source file was judged corrupt and removed.
    pub fn is_corrupt_input(&self) -> bool {
        matches!(self, ConvertError::Decode { .. })
    }
}

/// Failure reported by a [`Codec`](crate::codec::Codec) implementation.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct CodecError(pub String);

/// Directory listing errors for one tick.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The watched directory could not be listed
    #[error("Cannot list {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

/// Worker pool errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Every worker has exited; no more files can be queued
    #[error("Conversion queue is closed")]
    Closed,

    /// Shutdown started while waiting for queue space
    #[error("Dispatch cancelled")]
    Cancelled,
}

/// Convenience type alias for unwebp results.
pub type Result<T> = std::result::Result<T, UnwebpError>;
