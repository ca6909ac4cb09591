//! Document content caches.
//!
//! Content fetches are the expensive part of a search, so fetched page
//! text is cached per resource id. Two interchangeable backends:
//!
//! - [`MemoryCache`]: in-process, byte-budgeted LRU with a fixed TTL
//!   and entry-count bound.
//! - [`StoreCache`]: shared SQLite store with per-entry TTL expiry,
//!   async access via tokio-rusqlite, WAL mode for concurrent access.
//!
//! A cache failure must never fail the surrounding fetch: the fetch
//! path logs and treats any error here as a miss.

pub mod memory;
pub mod migrations;
pub mod store;

use std::sync::Arc;

use crate::config::{AppConfig, CacheBackendKind};
use crate::error::Error;

pub use memory::MemoryCache;
pub use store::StoreCache;

/// Get/put contract shared by both backends.
///
/// Keys uniquely identify one fetchable resource; at most one live
/// value per key at any instant, last-write-wins on concurrent put.
#[async_trait::async_trait]
pub trait DocumentCache: Send + Sync {
    /// Look up a cached value. `None` means miss or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, Error>;

    /// Insert or replace a value.
    async fn put(&self, key: &str, value: &str) -> Result<(), Error>;
}

/// Cache key for a document's fetched text.
pub fn document_key(document_id: &str) -> String {
    format!("document_text_{document_id}")
}

/// Handle to the configured backend, shared by concurrent fetches.
pub type CacheBackend = Option<Arc<dyn DocumentCache>>;

/// Construct the cache backend selected by configuration.
///
/// `CacheBackendKind::None` disables caching entirely.
pub async fn backend_from_config(config: &AppConfig) -> Result<CacheBackend, Error> {
    match config.cache_backend {
        CacheBackendKind::Memory => Ok(Some(Arc::new(MemoryCache::new(
            config.cache_max_bytes,
            config.cache_max_entries,
            config.cache_ttl(),
        )))),
        CacheBackendKind::Store => {
            let store = StoreCache::open(&config.db_path, config.cache_ttl()).await?;
            Ok(Some(Arc::new(store)))
        }
        CacheBackendKind::None => Ok(None),
    }
}
