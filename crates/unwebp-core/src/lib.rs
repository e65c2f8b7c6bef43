//! unwebp core - watch a directory and convert new WebP images to PNG.
//!
//! Every source file is converted at most once, including across restarts:
//! completed conversions are appended to a plain-text ledger that is replayed
//! on startup.
//!
//! # Architecture
//!
//! ```text
//! tick → Scanner (extension, freshness, ledger) → Dispatcher queue
//!      → N workers → Converter (read → decode → encode) → ledger append
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use unwebp_core::{Config, Watcher};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> unwebp_core::Result<()> {
//!     let config = Config::load()?;
//!     let watcher = Watcher::with_image_codec(config)?;
//!
//!     let cancel = CancellationToken::new();
//!     let summary = watcher.run(cancel).await;
//!     println!("Converted {} file(s)", summary.stats.converted);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod pipeline;
pub mod types;
pub mod watcher;

// Re-exports for convenient access
pub use codec::{Codec, DecodedImage, ImageCodec};
pub use config::Config;
pub use error::{
    CodecError, ConfigError, ConvertError, DispatchError, LedgerError, Result, ScanError,
    UnwebpError,
};
pub use ledger::{ProcessedRecord, ProcessedSet};
pub use pipeline::{Converter, Dispatcher, Scanner};
pub use types::{ConversionOutcome, DispatchStats, SourceFile, WatchSummary};
pub use watcher::{Watcher, WatcherState};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
