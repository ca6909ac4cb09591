//! Delegated end-user token strategy with tenant resolution.
//!
//! The caller hands us an OAuth bearer token per request. Headers are
//! trivially `Authorization: Bearer <token>`; the interesting part is
//! the base URL. Cloud deployments address a customer instance as
//! `.../ex/<product>/<org_id>`, and the org id has to be looked up from
//! the token via an "accessible resources" endpoint. One token maps to
//! one org id for its lifetime, so resolutions are cached per token
//! string; a failed resolution is not cached and retries on the next
//! call.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::Mutex;

use dredge_core::error::Error;

use crate::auth::AuthStrategy;

/// Token-to-org-id map shared across concurrent searches.
///
/// Append-mostly: read-heavy with rare inserts. First successful
/// resolution wins; a racing resolution for the same token discards
/// its own result in favor of the already-inserted one.
pub(crate) struct OrgIdCache {
    map: Mutex<HashMap<String, String>>,
}

impl OrgIdCache {
    pub(crate) fn new() -> Self {
        Self { map: Mutex::new(HashMap::new()) }
    }

    /// Return the cached org id for `token`, resolving it if absent.
    ///
    /// The lock is not held across the resolution call, so lookups for
    /// other tokens proceed while one resolution is in flight.
    pub(crate) async fn get_or_resolve<F, Fut>(&self, token: &str, resolve: F) -> Result<String, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, Error>>,
    {
        if let Some(org_id) = self.map.lock().await.get(token) {
            return Ok(org_id.clone());
        }

        let org_id = resolve().await?;

        let mut map = self.map.lock().await;
        Ok(map.entry(token.to_string()).or_insert(org_id).clone())
    }
}

/// Fields needed to resolve a tenant base URL from a token.
struct TenantResolver {
    http: reqwest::Client,
    resources_url: String,
    /// `{org_id}` is substituted with the resolved tenant id.
    base_url_template: String,
    org_ids: OrgIdCache,
}

#[derive(serde::Deserialize)]
struct AccessibleResource {
    id: String,
}

impl TenantResolver {
    async fn resolve(&self, token: &str) -> Result<String, Error> {
        let org_id = self
            .org_ids
            .get_or_resolve(token, || self.fetch_org_id(token))
            .await?;

        Ok(self.base_url_template.replace("{org_id}", &org_id))
    }

    async fn fetch_org_id(&self, token: &str) -> Result<String, Error> {
        tracing::debug!("resolving tenant from accessible-resources endpoint");

        let response = self
            .http
            .get(&self.resources_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("error determining tenant base URL: status {status}");
            return Err(Error::Auth(format!("tenant resolution failed: status {status}: {body}")));
        }

        let resources: Vec<AccessibleResource> = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed accessible-resources response: {e}")))?;

        match resources.first() {
            Some(resource) => Ok(resource.id.clone()),
            None => Err(Error::Auth("no resources accessible to this token".into())),
        }
    }
}

/// Delegated-token auth: bearer header from the per-call token, base
/// URL either static or resolved per token.
pub struct DelegatedTokenAuth {
    resolver: Option<TenantResolver>,
    static_base_url: Option<String>,
}

impl DelegatedTokenAuth {
    /// Delegated auth against a cloud deployment: base URLs are
    /// resolved through `resources_url` and cached per token.
    pub fn with_tenant_resolution(http: reqwest::Client, resources_url: String, base_url_template: String) -> Self {
        Self {
            resolver: Some(TenantResolver { http, resources_url, base_url_template, org_ids: OrgIdCache::new() }),
            static_base_url: None,
        }
    }

    /// Delegated auth against a fixed deployment: only the bearer
    /// header varies per request.
    pub fn with_static_base(base_url: String) -> Self {
        Self { resolver: None, static_base_url: Some(base_url) }
    }

    fn require_token<'t>(token: Option<&'t str>) -> Result<&'t str, Error> {
        token.ok_or_else(|| Error::Auth("no access token provided in request".into()))
    }
}

#[async_trait::async_trait]
impl AuthStrategy for DelegatedTokenAuth {
    async fn headers(&self, token: Option<&str>) -> Result<Vec<(String, String)>, Error> {
        let token = Self::require_token(token)?;
        Ok(vec![("Authorization".to_string(), format!("Bearer {token}"))])
    }

    async fn base_url(&self, token: Option<&str>) -> Result<String, Error> {
        match (&self.resolver, &self.static_base_url) {
            (Some(resolver), _) => {
                let token = Self::require_token(token)?;
                resolver.resolve(token).await
            }
            (None, Some(base_url)) => Ok(base_url.clone()),
            // Construction guarantees one of the two is set.
            (None, None) => Err(Error::Auth("delegated auth has no base URL source".into())),
        }
    }
}
