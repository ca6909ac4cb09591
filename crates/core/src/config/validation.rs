//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// Strategy-specific required fields are checked later, when the
    /// selected auth strategy is constructed; this pass only rejects
    /// values that are nonsense for every strategy.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `search_limit` is 0
    /// - `cache_max_bytes` or `cache_max_entries` is 0
    /// - `max_concurrency` is 0
    /// - `timeout_ms` is less than 100ms
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_limit == 0 {
            return Err(ConfigError::Invalid { field: "search_limit".into(), reason: "must be greater than 0".into() });
        }

        if self.cache_max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_max_bytes".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrency".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.extract_timeout_ms < self.timeout_ms {
            return Err(ConfigError::Invalid {
                field: "extract_timeout_ms".into(),
                reason: "must not be shorter than timeout_ms".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        Ok(())
    }
}
