//! Bounded-concurrency content fetching with per-item failure
//! isolation.
//!
//! One search produces a batch of hits whose content is fetched in
//! parallel: a semaphore caps fan-out, a per-item timeout bounds each
//! network call, and any item that fails, times out, or is rejected
//! upstream is dropped from the batch without failing the rest.
//!
//! Before a network call the cache is consulted by item id; on a hit
//! the call is skipped entirely, on a miss the fetched value is
//! written back. Cache errors are logged and treated as misses —
//! caching is an optimization, never a correctness dependency.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use dredge_core::cache::{CacheBackend, document_key};
use dredge_core::error::Error;

/// Concurrent fetch executor shared by all providers.
#[derive(Clone)]
pub struct ContentFetcher {
    cache: CacheBackend,
    max_concurrency: usize,
    timeout: Duration,
}

impl ContentFetcher {
    pub fn new(cache: CacheBackend, max_concurrency: usize, timeout: Duration) -> Self {
        Self { cache, max_concurrency: max_concurrency.max(1), timeout }
    }

    /// Fetch content for every item, returning values keyed by item
    /// id. Items whose fetch fails or times out are absent from the
    /// result; the map order carries no meaning.
    pub async fn fetch_all<T, F, Fut>(&self, items: Vec<(String, T)>, fetch: F) -> HashMap<String, String>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<String, Error>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (id, item) in items {
            let permit = semaphore.clone().acquire_owned().await.unwrap();
            let cache = self.cache.clone();
            let fetch = fetch.clone();
            let timeout = self.timeout;

            join_set.spawn(async move {
                // NOTE: Hold permit for task duration to enforce concurrency limit
                let _permit = permit;
                let key = document_key(&id);

                if let Some(cache) = &cache {
                    match cache.get(&key).await {
                        Ok(Some(value)) => {
                            tracing::debug!("cache hit for {id}");
                            return (id, Some(value));
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("cache read failed for {id}, treating as miss: {e}"),
                    }
                }

                match tokio::time::timeout(timeout, fetch(item)).await {
                    Ok(Ok(content)) => {
                        if let Some(cache) = &cache
                            && let Err(e) = cache.put(&key, &content).await
                        {
                            tracing::warn!("cache write failed for {id}: {e}");
                        }
                        (id, Some(content))
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("content fetch failed for {id}: {e}");
                        (id, None)
                    }
                    Err(_) => {
                        tracing::warn!("content fetch timed out for {id} after {timeout:?}");
                        (id, None)
                    }
                }
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, Some(content))) => {
                    results.insert(id, content);
                }
                Ok((_, None)) => {}
                Err(e) => tracing::warn!("fetch task failed to join: {e}"),
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dredge_core::cache::{DocumentCache, MemoryCache};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fetcher(cache: CacheBackend) -> ContentFetcher {
        ContentFetcher::new(cache, 4, Duration::from_millis(200))
    }

    fn items(ids: &[&str]) -> Vec<(String, String)> {
        ids.iter().map(|id| ((*id).to_string(), (*id).to_string())).collect()
    }

    #[tokio::test]
    async fn test_fetch_all_success() {
        let results = fetcher(None)
            .fetch_all(items(&["1", "2"]), |item| async move { Ok(format!("content-{item}")) })
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["1"], "content-1");
        assert_eq!(results["2"], "content-2");
    }

    #[tokio::test]
    async fn test_item_failure_drops_only_that_item() {
        let results = fetcher(None)
            .fetch_all(items(&["good", "bad"]), |item| async move {
                if item == "bad" {
                    Err(Error::Upstream { status: 404, body: "not found".into() })
                } else {
                    Ok("ok".to_string())
                }
            })
            .await;

        assert_eq!(results.len(), 1);
        assert!(results.contains_key("good"));
    }

    #[tokio::test]
    async fn test_timeout_is_a_soft_failure() {
        let results = fetcher(None)
            .fetch_all(items(&["slow", "fast"]), |item| async move {
                if item == "slow" {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok("ok".to_string())
            })
            .await;

        assert_eq!(results.len(), 1);
        assert!(results.contains_key("fast"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let cache = Arc::new(MemoryCache::new(1024, 16, Duration::from_secs(3600)));
        cache.put(&document_key("1"), "cached").await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let results = fetcher(Some(cache))
            .fetch_all(items(&["1"]), move |_| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok("fresh".to_string())
                }
            })
            .await;

        assert_eq!(results["1"], "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_miss_populates_cache() {
        let cache = Arc::new(MemoryCache::new(1024, 16, Duration::from_secs(3600)));

        let results = fetcher(Some(cache.clone()))
            .fetch_all(items(&["1"]), |_| async { Ok("fetched".to_string()) })
            .await;

        assert_eq!(results["1"], "fetched");
        assert_eq!(cache.get(&document_key("1")).await.unwrap().as_deref(), Some("fetched"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let fetcher = ContentFetcher::new(None, 2, Duration::from_secs(5));
        let (in_flight_c, peak_c) = (in_flight.clone(), peak.clone());

        fetcher
            .fetch_all(items(&["1", "2", "3", "4", "5", "6"]), move |_| {
                let in_flight = in_flight_c.clone();
                let peak = peak_c.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok("ok".to_string())
                }
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
