//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (DREDGE_*)
//! 2. TOML config file (if DREDGE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Authentication strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Caller supplies a bearer token per request; the tenant base URL
    /// is resolved from that token.
    #[default]
    Delegated,
    /// Fixed service account, HTTP Basic header.
    Service,
    /// Tenant/client id/secret exchanged for a bearer token.
    ClientCredential,
}

/// Cache backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    /// In-process, byte-budgeted LRU.
    #[default]
    Memory,
    /// Shared SQLite store with per-entry TTL.
    Store,
    /// Caching disabled; every fetch goes to the network.
    None,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (DREDGE_*)
/// 2. TOML config file (if DREDGE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which auth strategy the connector constructs.
    #[serde(default)]
    pub auth_method: AuthMethod,

    /// Fixed upstream base URL for the service strategies.
    ///
    /// Required for `auth_method = "service"`; the delegated strategy
    /// resolves its base URL per token instead.
    #[serde(default)]
    pub product_url: Option<String>,

    /// Service account user for HTTP Basic auth.
    #[serde(default)]
    pub service_user: Option<String>,

    /// Service account secret / API token for HTTP Basic auth.
    #[serde(default)]
    pub service_secret: Option<String>,

    /// Tenant id for the client-credential token exchange.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Client id for the client-credential token exchange.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for the client-credential token exchange.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Maximum number of hits considered for content fetch.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Which cache backend the fetcher consults.
    #[serde(default)]
    pub cache_backend: CacheBackendKind,

    /// Byte budget for the in-memory cache (total serialized value size).
    #[serde(default = "default_cache_max_bytes")]
    pub cache_max_bytes: usize,

    /// Secondary entry-count bound for the in-memory cache.
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Entry TTL in seconds (both backends).
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Path to the SQLite store for `cache_backend = "store"`.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Per-request timeout for search and page-content calls, in ms.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Per-request timeout for bulk document-extraction calls, in ms.
    /// The extraction service is slow by design.
    #[serde(default = "default_extract_timeout_ms")]
    pub extract_timeout_ms: u64,

    /// Upper bound on concurrent content fetches per search.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Extra stopwords merged into the base English list.
    #[serde(default)]
    pub extended_stopwords: Vec<String>,

    /// File extensions whose raw bytes pass through as document text.
    #[serde(default)]
    pub passthrough_file_types: Vec<String>,

    /// File extensions routed through the extraction service.
    #[serde(default)]
    pub extractable_file_types: Vec<String>,

    /// Base URL of the document-extraction service. Required only when
    /// `extractable_file_types` is non-empty.
    #[serde(default)]
    pub extract_base_url: Option<String>,

    /// API key forwarded to the extraction service, if it wants one.
    #[serde(default)]
    pub extract_api_key: Option<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_search_limit() -> usize {
    10
}

fn default_cache_max_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_cache_max_entries() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./dredge-cache.sqlite")
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_extract_timeout_ms() -> u64 {
    3_600_000
}

fn default_max_concurrency() -> usize {
    8
}

fn default_user_agent() -> String {
    "dredge/0.1".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth_method: AuthMethod::Delegated,
            product_url: None,
            service_user: None,
            service_secret: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            search_limit: default_search_limit(),
            cache_backend: CacheBackendKind::Memory,
            cache_max_bytes: default_cache_max_bytes(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            db_path: default_db_path(),
            timeout_ms: default_timeout_ms(),
            extract_timeout_ms: default_extract_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            extended_stopwords: Vec::new(),
            passthrough_file_types: Vec::new(),
            extractable_file_types: Vec::new(),
            extract_base_url: None,
            extract_api_key: None,
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Extraction-service timeout as Duration.
    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }

    /// Entry TTL as Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `DREDGE_`
    /// 2. TOML file from `DREDGE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("DREDGE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("DREDGE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Required setting accessor for strategy construction.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` when the value is absent or empty.
    pub fn require(value: &Option<String>, field: &str, hint: &str) -> Result<String, ConfigError> {
        match value.as_deref() {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(ConfigError::Missing { field: field.into(), hint: hint.into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.auth_method, AuthMethod::Delegated);
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.cache_max_bytes, 20 * 1024 * 1024);
        assert_eq!(config.cache_max_entries, 1000);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.extract_timeout_ms, 3_600_000);
        assert_eq!(config.max_concurrency, 8);
        assert!(config.product_url.is_none());
        assert!(config.extended_stopwords.is_empty());
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.extract_timeout(), Duration::from_secs(3600));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_require_missing() {
        let result = AppConfig::require(&None, "product_url", "set DREDGE_PRODUCT_URL");
        assert!(matches!(result, Err(ConfigError::Missing { .. })));

        let result = AppConfig::require(&Some(String::new()), "product_url", "set DREDGE_PRODUCT_URL");
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_present() {
        let value = Some("https://example.atlassian.net".to_string());
        let result = AppConfig::require(&value, "product_url", "set DREDGE_PRODUCT_URL");
        assert_eq!(result.unwrap(), "https://example.atlassian.net");
    }

    #[test]
    fn test_auth_method_deserializes_snake_case() {
        let method: AuthMethod = serde_json::from_str("\"client_credential\"").unwrap();
        assert_eq!(method, AuthMethod::ClientCredential);
    }
}
