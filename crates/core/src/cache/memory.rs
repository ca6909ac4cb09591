//! In-process LRU cache bounded by total value size.
//!
//! Admission is unconditional: every put is accepted, then the
//! least-recently-used entries are evicted until the total serialized
//! size of all values fits the byte budget again. `get` promotes an
//! entry's recency, so eviction order tracks access, not insertion.
//!
//! Secondary bounds: a maximum entry count (enforced by the underlying
//! `LruCache` capacity) and a fixed per-entry TTL checked on read.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use tokio::sync::Mutex;

use crate::cache::DocumentCache;
use crate::error::Error;

struct Entry {
    value: String,
    size_bytes: usize,
    inserted_at: Instant,
}

struct Inner {
    map: LruCache<String, Entry>,
    total_bytes: usize,
}

/// Byte-budgeted, TTL'd LRU cache.
///
/// All mutation happens under one async mutex: content fetches run
/// concurrently, and the eviction scan must serialize against inserts.
pub struct MemoryCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
    ttl: Duration,
}

impl MemoryCache {
    /// Create a cache with the given byte budget, entry-count bound,
    /// and per-entry TTL.
    pub fn new(max_bytes: usize, max_entries: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner { map: LruCache::new(capacity), total_bytes: 0 }),
            max_bytes,
            ttl,
        }
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.map.len()
    }

    /// Total serialized size of all cached values, in bytes.
    pub async fn size_bytes(&self) -> usize {
        self.inner.lock().await.total_bytes
    }
}

#[async_trait::async_trait]
impl DocumentCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let mut inner = self.inner.lock().await;

        let expired = match inner.map.get(key) {
            Some(entry) if entry.inserted_at.elapsed() > self.ttl => true,
            Some(entry) => return Ok(Some(entry.value.clone())),
            None => return Ok(None),
        };

        if expired
            && let Some(entry) = inner.map.pop(key)
        {
            inner.total_bytes -= entry.size_bytes;
        }

        Ok(None)
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), Error> {
        let size_bytes = value.len();
        let entry = Entry { value: value.to_string(), size_bytes, inserted_at: Instant::now() };

        let mut inner = self.inner.lock().await;

        // push returns the replaced value for an existing key, or the
        // LRU entry evicted to stay under the capacity bound.
        if let Some((_, displaced)) = inner.map.push(key.to_string(), entry) {
            inner.total_bytes -= displaced.size_bytes;
        }
        inner.total_bytes += size_bytes;

        while inner.total_bytes > self.max_bytes {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.total_bytes -= evicted.size_bytes,
                None => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    fn value_of_size(n: usize) -> String {
        "x".repeat(n)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = MemoryCache::new(1024, 16, LONG_TTL);
        cache.put("a", "hello").await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_byte_budget_evicts_lru_first() {
        let cache = MemoryCache::new(100, 16, LONG_TTL);
        cache.put("a", &value_of_size(40)).await.unwrap();
        cache.put("b", &value_of_size(40)).await.unwrap();

        // Third insert blows the budget; "a" is least recently used.
        cache.put("c", &value_of_size(40)).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.get("b").await.unwrap().is_some());
        assert!(cache.get("c").await.unwrap().is_some());
        assert!(cache.size_bytes().await <= 100);
    }

    #[tokio::test]
    async fn test_get_promotes_recency() {
        let cache = MemoryCache::new(100, 16, LONG_TTL);
        cache.put("a", &value_of_size(40)).await.unwrap();
        cache.put("b", &value_of_size(40)).await.unwrap();

        // Touch "a" so "b" becomes the eviction candidate.
        cache.get("a").await.unwrap();
        cache.put("c", &value_of_size(40)).await.unwrap();

        assert!(cache.get("a").await.unwrap().is_some());
        assert_eq!(cache.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_on_update_adjusts_size() {
        let cache = MemoryCache::new(1024, 16, LONG_TTL);
        cache.put("a", &value_of_size(100)).await.unwrap();
        cache.put("a", &value_of_size(10)).await.unwrap();

        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.size_bytes().await, 10);
    }

    #[tokio::test]
    async fn test_entry_count_bound() {
        let cache = MemoryCache::new(usize::MAX, 2, LONG_TTL);
        cache.put("a", "1").await.unwrap();
        cache.put("b", "2").await.unwrap();
        cache.put("c", "3").await.unwrap();

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new(1024, 16, Duration::from_millis(20));
        cache.put("a", "hello").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_accounting_consistent() {
        let cache = std::sync::Arc::new(MemoryCache::new(10_000, 256, LONG_TTL));

        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache.put(&format!("key{i}"), &value_of_size(100)).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 32);
        assert_eq!(cache.size_bytes().await, 3200);
    }
}
