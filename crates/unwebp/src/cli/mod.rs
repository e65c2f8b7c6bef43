//! Subcommand implementations.

pub mod config;
pub mod ledger;
pub mod scan;
pub mod watch;

use std::path::Path;
use unwebp_core::{Config, ConfigError};

/// Load the config from `path`, or from the default location when `None`.
///
/// An explicit path must exist; the default location may be absent.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Where `config` subcommands read and write.
pub fn config_path(path: Option<&Path>) -> std::path::PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(Config::default_path)
}
