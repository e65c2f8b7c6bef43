//! Configuration management for unwebp.
//!
//! Configuration is loaded from the platform config directory with sensible
//! defaults. Every key is optional; a missing file means "all defaults", which
//! watches the current directory for `.webp` files.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for unwebp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Watched directory settings
    pub watch: WatchConfig,

    /// Converted output settings
    pub output: OutputConfig,

    /// Processed-files ledger settings
    pub ledger: LedgerConfig,

    /// Worker pool settings
    pub dispatch: DispatchConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// - macOS: ~/Library/Application Support/com.unwebp.unwebp/config.toml
    /// - Linux: ~/.config/unwebp/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\unwebp\config\config.toml
    ///
    /// Falls back to ~/.unwebp/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "unwebp", "unwebp")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".unwebp").join("config.toml")
            })
    }

    /// Get the resolved watched directory (with ~ expansion).
    pub fn watch_dir(&self) -> PathBuf {
        expand(&self.watch.dir)
    }

    /// Get the resolved output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.output.dir)
    }

    /// Get the resolved ledger path.
    pub fn ledger_path(&self) -> PathBuf {
        self.resolve(&self.ledger.path)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = expand(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.watch_dir().join(expanded)
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&path_str).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.watch.scan_interval_secs, 10);
        assert_eq!(config.watch.source_extension, "webp");
        assert_eq!(config.dispatch.max_concurrent_conversions, 4);
        assert_eq!(config.ledger.on_malformed, MalformedLinePolicy::Abort);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[watch]"));
        assert!(toml.contains("[dispatch]"));
        assert!(toml.contains("on_malformed = \"abort\""));
    }

    #[test]
    fn test_relative_paths_resolve_against_watch_dir() {
        let mut config = Config::default();
        config.watch.dir = PathBuf::from("/srv/inbox");
        assert_eq!(config.output_dir(), PathBuf::from("/srv/inbox/converted"));
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/srv/inbox/processed_files.log")
        );

        config.ledger.path = PathBuf::from("/var/lib/unwebp/ledger.log");
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/var/lib/unwebp/ledger.log")
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[watch]\nscan_interval_secs = 3\n\n[ledger]\non_malformed = \"skip\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.watch.scan_interval_secs, 3);
        assert_eq!(config.watch.source_extension, "webp");
        assert_eq!(config.ledger.on_malformed, MalformedLinePolicy::Skip);
        assert_eq!(config.output.name_length, 10);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[dispatch]\nmax_concurrent_conversions = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }
}
