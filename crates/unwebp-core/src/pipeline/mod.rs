//! Watch-and-convert pipeline components.
//!
//! - **scanner**: lists the watched directory and applies the admission filter
//! - **converter**: turns one source file into one destination file
//! - **dispatcher**: bounded worker pool that runs conversions and records them

pub mod converter;
pub mod dispatcher;
pub mod scanner;

// Re-exports for convenient access
pub use converter::Converter;
pub use dispatcher::Dispatcher;
pub use scanner::{admission_cutoff, Candidates, Scanner};
