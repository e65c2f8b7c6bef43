//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.scan_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "watch.scan_interval_secs must be > 0".into(),
            ));
        }
        let ext = &self.watch.source_extension;
        if ext.is_empty() || ext.starts_with('.') || ext.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "watch.source_extension must be a bare extension like \"webp\", got {ext:?}"
            )));
        }
        if self.output.name_length == 0 {
            return Err(ConfigError::ValidationError(
                "output.name_length must be > 0".into(),
            ));
        }
        // Destination paths are written as one whitespace-delimited ledger field.
        if self.output.dir.to_string_lossy().chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationError(
                "output.dir must not contain whitespace".into(),
            ));
        }
        if self.ledger.path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "ledger.path must not be empty".into(),
            ));
        }
        if self.dispatch.max_concurrent_conversions == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.max_concurrent_conversions must be > 0".into(),
            ));
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "dispatch.queue_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }
}
