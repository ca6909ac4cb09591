//! Search orchestration: auth + query + search + concurrent fetch.
//!
//! [`SearchConnector`] runs one search end to end: resolve
//! credentials, build the provider query, call the upstream search
//! endpoint, filter and truncate the hits, fan out content fetches
//! through the cache-aware [`ContentFetcher`], and assemble the
//! surviving (hit, content) pairs into [`Document`]s.
//!
//! Failure policy: credential/config resolution and the top-level
//! search call abort the request; a single content fetch failing,
//! timing out, or answering non-success drops that item only.

pub mod confluence;
pub mod graph;
pub mod unstructured;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use dredge_core::cache::backend_from_config;
use dredge_core::config::AppConfig;
use dredge_core::error::Error;

use crate::auth::{AuthEndpoints, AuthStrategy, Credentials};
use crate::fetch::ContentFetcher;
use crate::query::QueryBuilder;

pub use confluence::ConfluenceProvider;
pub use graph::GraphProvider;
pub use unstructured::{ExtractFile, UnstructuredClient};

/// One upstream search result referencing a fetchable resource.
///
/// Immutable after creation. `raw` preserves the upstream resource
/// fields for metadata passthrough.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    /// Provider type discriminator; hits with an unrecognized kind are
    /// skipped, not errors.
    pub kind: Option<String>,
    pub raw: serde_json::Value,
}

/// The output unit: hit metadata merged with fetched content.
///
/// Owned by the caller once returned; never mutated after assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: String,
    /// Scalar upstream fields; composites are dropped because the
    /// consumer cannot represent nested structures.
    #[serde(flatten)]
    pub metadata: HashMap<String, String>,
}

/// Content fetched for one hit.
///
/// This is what gets cached (as JSON), so a cache hit restores
/// everything assembly needs — some providers only learn the final
/// page URL and title from the content call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedContent {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl FetchedContent {
    pub fn text_only(text: String) -> Self {
        Self { text, title: None, url: None }
    }

    fn into_cache_value(self) -> Result<String, Error> {
        serde_json::to_string(&self).map_err(|e| Error::Http(format!("failed to serialize content: {e}")))
    }

    fn from_cache_value(value: String) -> Self {
        // Tolerate values cached by older revisions as bare text.
        serde_json::from_str(&value).unwrap_or(Self { text: value, title: None, url: None })
    }
}

/// Map a transport failure onto the error taxonomy. Timeouts are
/// distinguished because the fetcher budget also produces them.
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::Timeout(err.to_string()) } else { Error::Http(err.to_string()) }
}

/// Turn a non-success response into [`Error::Upstream`], preserving the
/// upstream body verbatim for diagnostics.
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Upstream { status: status.as_u16(), body })
}

/// Keep only primitive scalar values from an upstream resource object.
pub fn scalar_metadata(raw: &serde_json::Value) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Some(object) = raw.as_object() {
        for (key, value) in object {
            match value {
                serde_json::Value::String(s) => {
                    metadata.insert(key.clone(), s.clone());
                }
                serde_json::Value::Number(n) => {
                    metadata.insert(key.clone(), n.to_string());
                }
                serde_json::Value::Bool(b) => {
                    metadata.insert(key.clone(), b.to_string());
                }
                _ => {}
            }
        }
    }

    metadata
}

/// An upstream search API, reduced to the calls the connector makes.
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Endpoints consumed by auth strategy construction.
    fn auth_endpoints(&self) -> AuthEndpoints;

    /// Execute the search call. A non-success response is an
    /// [`Error::Upstream`] carrying the upstream body.
    async fn search(
        &self, http: &reqwest::Client, creds: &Credentials, query: &str, limit: usize,
    ) -> Result<Vec<SearchHit>, Error>;

    /// Whether a hit references a resource kind this provider can
    /// fetch.
    fn recognizes(&self, hit: &SearchHit) -> bool;

    /// Fetch full content for one hit. Failures here are soft: the
    /// fetcher drops the item and the search continues.
    async fn fetch_content(
        &self, http: &reqwest::Client, creds: &Credentials, hit: &SearchHit,
    ) -> Result<FetchedContent, Error>;
}

/// One search client instance: explicitly constructed, injectable, no
/// process-wide globals. Cache and auth state live inside.
pub struct SearchConnector {
    http: reqwest::Client,
    auth: Arc<dyn AuthStrategy>,
    query: Box<dyn QueryBuilder>,
    provider: Arc<dyn Provider>,
    fetcher: ContentFetcher,
    search_limit: usize,
}

impl SearchConnector {
    pub fn new(
        http: reqwest::Client, auth: Arc<dyn AuthStrategy>, query: Box<dyn QueryBuilder>, provider: Arc<dyn Provider>,
        fetcher: ContentFetcher, search_limit: usize,
    ) -> Self {
        Self { http, auth, query, provider, fetcher, search_limit }
    }

    /// Compose a connector from configuration: HTTP client, auth
    /// strategy, cache backend, fetcher. Fails fast on missing
    /// strategy settings or an unopenable cache store.
    pub async fn from_config(
        config: &AppConfig, provider: Arc<dyn Provider>, query: Box<dyn QueryBuilder>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        let auth = crate::auth::from_config(&http, config, &provider.auth_endpoints())?;
        let cache = backend_from_config(config).await?;
        let fetcher = ContentFetcher::new(cache, config.max_concurrency, config.timeout());

        Ok(Self::new(http, auth, query, provider, fetcher, config.search_limit))
    }

    /// Execute one search: `text` plus an optional end-user bearer
    /// token. An empty result list is a valid, non-error outcome.
    pub async fn search(&self, text: &str, access_token: Option<&str>) -> Result<Vec<Document>, Error> {
        let mut creds = self.auth.credentials(access_token).await?;
        let query = self.query.build(text);

        tracing::debug!(provider = self.provider.name(), query = %query, "searching upstream");

        let first = self.provider.search(&self.http, &creds, &query, self.search_limit).await;
        let mut hits = match first {
            Ok(hits) => hits,
            // One retry with fresh credentials when the upstream
            // rejects ours; covers an expired service token.
            Err(Error::Upstream { status: 401, .. }) => {
                tracing::debug!("upstream rejected credentials, refreshing and retrying once");
                self.auth.invalidate().await;
                creds = self.auth.credentials(access_token).await?;
                self.provider.search(&self.http, &creds, &query, self.search_limit).await?
            }
            Err(e) => return Err(e),
        };

        // Conjunctive query found nothing: retry once with the
        // builder's broader form, same token set.
        if hits.is_empty()
            && let Some(fallback) = self.query.fallback(text)
        {
            tracing::debug!(query = %fallback, "zero hits, retrying with disjunctive query");
            hits = self.provider.search(&self.http, &creds, &fallback, self.search_limit).await?;
        }

        let total_hits = hits.len();
        let retained: Vec<SearchHit> = hits
            .into_iter()
            .filter(|hit| {
                let keep = self.provider.recognizes(hit);
                if !keep {
                    tracing::debug!("skipping unrecognized hit {}", hit.id);
                }
                keep
            })
            .take(self.search_limit)
            .collect();

        tracing::debug!("retained {} of {} hits for content fetch", retained.len(), total_hits);

        let items: Vec<(String, SearchHit)> = retained.iter().map(|hit| (hit.id.clone(), hit.clone())).collect();

        let provider = self.provider.clone();
        let http = self.http.clone();
        let fetch_creds = creds.clone();
        let mut contents = self
            .fetcher
            .fetch_all(items, move |hit: SearchHit| {
                let provider = provider.clone();
                let http = http.clone();
                let creds = fetch_creds.clone();
                async move {
                    let content = provider.fetch_content(&http, &creds, &hit).await?;
                    content.into_cache_value()
                }
            })
            .await;

        let documents = retained
            .into_iter()
            .filter_map(|hit| contents.remove(&hit.id).map(|value| assemble(hit, FetchedContent::from_cache_value(value))))
            .collect();

        Ok(documents)
    }
}

/// Merge a hit with its fetched content into a [`Document`].
fn assemble(hit: SearchHit, content: FetchedContent) -> Document {
    let mut metadata = scalar_metadata(&hit.raw);
    // These are first-class fields; leaving them in the flattened
    // metadata would duplicate keys in the serialized form.
    for key in ["id", "title", "url", "text"] {
        metadata.remove(key);
    }

    Document {
        id: hit.id,
        title: content.title.or(hit.title),
        url: content.url.or(hit.url),
        text: content.text,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn hit(id: &str, kind: &str) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: Some(format!("title-{id}")),
            url: Some(format!("https://example.com/{id}")),
            kind: Some(kind.to_string()),
            raw: serde_json::json!({ "id": id, "size": 42, "labels": ["a", "b"], "starred": true }),
        }
    }

    /// Scripted provider: queued search responses, per-id fetch
    /// outcomes, call recording.
    struct StubProvider {
        search_responses: Mutex<Vec<Result<Vec<SearchHit>, Error>>>,
        queries: Mutex<Vec<String>>,
        failing_fetches: Vec<String>,
        fetch_calls: AtomicUsize,
    }

    impl StubProvider {
        fn new(responses: Vec<Result<Vec<SearchHit>, Error>>) -> Self {
            Self {
                search_responses: Mutex::new(responses),
                queries: Mutex::new(Vec::new()),
                failing_fetches: Vec::new(),
                fetch_calls: AtomicUsize::new(0),
            }
        }

        fn with_failing_fetches(mut self, ids: &[&str]) -> Self {
            self.failing_fetches = ids.iter().map(|id| (*id).to_string()).collect();
            self
        }

        fn recorded_queries(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn auth_endpoints(&self) -> AuthEndpoints {
            AuthEndpoints::default()
        }

        async fn search(
            &self, _http: &reqwest::Client, _creds: &Credentials, query: &str, _limit: usize,
        ) -> Result<Vec<SearchHit>, Error> {
            self.queries.lock().unwrap().push(query.to_string());
            let mut responses = self.search_responses.lock().unwrap();
            if responses.is_empty() {
                return Ok(Vec::new());
            }
            responses.remove(0)
        }

        fn recognizes(&self, hit: &SearchHit) -> bool {
            hit.kind.as_deref() == Some("page")
        }

        async fn fetch_content(
            &self, _http: &reqwest::Client, _creds: &Credentials, hit: &SearchHit,
        ) -> Result<FetchedContent, Error> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if self.failing_fetches.contains(&hit.id) {
                return Err(Error::Upstream { status: 404, body: "gone".into() });
            }
            Ok(FetchedContent::text_only(format!("body-{}", hit.id)))
        }
    }

    struct StubAuth {
        invalidations: AtomicUsize,
    }

    impl StubAuth {
        fn new() -> Self {
            Self { invalidations: AtomicUsize::new(0) }
        }
    }

    #[async_trait::async_trait]
    impl crate::auth::AuthStrategy for StubAuth {
        async fn headers(&self, _token: Option<&str>) -> Result<Vec<(String, String)>, Error> {
            Ok(vec![("Authorization".to_string(), "Bearer stub".to_string())])
        }

        async fn base_url(&self, _token: Option<&str>) -> Result<String, Error> {
            Ok("https://upstream.example.com".to_string())
        }

        async fn invalidate(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StaticQuery;

    impl QueryBuilder for StaticQuery {
        fn build(&self, text: &str) -> String {
            format!("q:{text}")
        }
    }

    struct FallbackQuery;

    impl QueryBuilder for FallbackQuery {
        fn build(&self, text: &str) -> String {
            format!("and:{text}")
        }

        fn fallback(&self, text: &str) -> Option<String> {
            Some(format!("or:{text}"))
        }
    }

    fn connector(provider: Arc<StubProvider>, query: Box<dyn QueryBuilder>, limit: usize) -> SearchConnector {
        SearchConnector::new(
            reqwest::Client::new(),
            Arc::new(StubAuth::new()),
            query,
            provider,
            ContentFetcher::new(None, 4, Duration::from_secs(1)),
            limit,
        )
    }

    #[tokio::test]
    async fn test_search_assembles_documents() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![hit("1", "page"), hit("2", "page")])]));
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let mut documents = connector.search("project roadmap Q3", None).await.unwrap();
        documents.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].text, "body-1");
        assert_eq!(documents[0].title.as_deref(), Some("title-1"));
        assert_eq!(documents[0].url.as_deref(), Some("https://example.com/1"));
    }

    #[tokio::test]
    async fn test_metadata_keeps_scalars_only() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![hit("1", "page")])]));
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let documents = connector.search("anything", None).await.unwrap();
        let metadata = &documents[0].metadata;

        assert_eq!(metadata.get("size").map(String::as_str), Some("42"));
        assert_eq!(metadata.get("starred").map(String::as_str), Some("true"));
        assert!(!metadata.contains_key("labels"));
        assert!(!metadata.contains_key("id"));
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_with_body() {
        let provider = Arc::new(StubProvider::new(vec![Err(Error::Upstream {
            status: 500,
            body: "upstream exploded".into(),
        })]));
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let err = connector.search("anything", None).await.unwrap_err();
        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "upstream exploded");
            }
            other => panic!("expected upstream error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_soft_fetch_failure_drops_item_only() {
        let provider = Arc::new(
            StubProvider::new(vec![Ok(vec![hit("1", "page"), hit("2", "page")])]).with_failing_fetches(&["2"]),
        );
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let documents = connector.search("anything", None).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "1");
    }

    #[tokio::test]
    async fn test_unrecognized_hits_skipped_silently() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![hit("1", "page"), hit("2", "calendar")])]));
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let documents = connector.search("anything", None).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "1");
    }

    #[tokio::test]
    async fn test_limit_applies_before_fetch() {
        let hits: Vec<SearchHit> = (0..8).map(|i| hit(&i.to_string(), "page")).collect();
        let provider = Arc::new(StubProvider::new(vec![Ok(hits)]));
        let connector = connector(provider.clone(), Box::new(StaticQuery), 3);

        let documents = connector.search("anything", None).await.unwrap();

        assert_eq!(documents.len(), 3);
        assert_eq!(provider.fetch_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_hits_retries_fallback_exactly_once() {
        let provider = Arc::new(StubProvider::new(vec![Ok(Vec::new()), Ok(Vec::new())]));
        let connector = connector(provider.clone(), Box::new(FallbackQuery), 10);

        let documents = connector.search("roadmap", None).await.unwrap();

        assert!(documents.is_empty());
        assert_eq!(provider.recorded_queries(), vec!["and:roadmap".to_string(), "or:roadmap".to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_results_are_used() {
        let provider = Arc::new(StubProvider::new(vec![Ok(Vec::new()), Ok(vec![hit("1", "page")])]));
        let connector = connector(provider, Box::new(FallbackQuery), 10);

        let documents = connector.search("roadmap", None).await.unwrap();
        assert_eq!(documents.len(), 1);
    }

    #[tokio::test]
    async fn test_no_fallback_means_no_retry() {
        let provider = Arc::new(StubProvider::new(vec![Ok(Vec::new())]));
        let connector = connector(provider.clone(), Box::new(StaticQuery), 10);

        let documents = connector.search("roadmap", None).await.unwrap();

        assert!(documents.is_empty());
        assert_eq!(provider.recorded_queries().len(), 1);
    }

    #[tokio::test]
    async fn test_401_invalidates_and_retries_once() {
        let provider = Arc::new(StubProvider::new(vec![
            Err(Error::Upstream { status: 401, body: "expired".into() }),
            Ok(vec![hit("1", "page")]),
        ]));
        let auth = Arc::new(StubAuth::new());
        let connector = SearchConnector::new(
            reqwest::Client::new(),
            auth.clone(),
            Box::new(StaticQuery),
            provider,
            ContentFetcher::new(None, 4, Duration::from_secs(1)),
            10,
        );

        let documents = connector.search("anything", None).await.unwrap();

        assert_eq!(documents.len(), 1);
        assert_eq!(auth.invalidations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_401_propagates() {
        let provider = Arc::new(StubProvider::new(vec![
            Err(Error::Upstream { status: 401, body: "expired".into() }),
            Err(Error::Upstream { status: 401, body: "still expired".into() }),
        ]));
        let connector = connector(provider, Box::new(StaticQuery), 10);

        let err = connector.search("anything", None).await.unwrap_err();
        assert!(matches!(err, Error::Upstream { status: 401, .. }));
    }

    #[test]
    fn test_fetched_content_cache_round_trip() {
        let content = FetchedContent { text: "body".into(), title: Some("t".into()), url: None };
        let value = content.clone().into_cache_value().unwrap();
        let restored = FetchedContent::from_cache_value(value);
        assert_eq!(restored.text, "body");
        assert_eq!(restored.title.as_deref(), Some("t"));
    }

    #[test]
    fn test_stale_cache_value_treated_as_bare_text() {
        let restored = FetchedContent::from_cache_value("plain page body".to_string());
        assert_eq!(restored.text, "plain page body");
        assert!(restored.title.is_none());
    }
}
