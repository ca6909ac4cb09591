//! Interchangeable authentication strategies.
//!
//! Every upstream call needs two things: a set of auth headers and a
//! base URL. How they are produced differs per deployment:
//!
//! - [`DelegatedTokenAuth`]: the caller supplies an end-user bearer
//!   token per request; the tenant base URL is either static or
//!   resolved from that token via an "accessible resources" endpoint.
//! - [`BasicServiceAuth`]: a fixed service account, HTTP Basic header,
//!   static base URL.
//! - [`ClientCredentialAuth`]: tenant/client id/secret exchanged for a
//!   bearer token. The exchange is lazy (first use) and the token is
//!   reused until [`AuthStrategy::invalidate`] is called, which callers
//!   do on an upstream 401. There is no proactive refresh.
//!
//! Missing settings for the selected strategy fail at construction;
//! exchange or resolution failures at request time surface as
//! [`Error::Auth`] and classify as upstream failures.

pub mod delegated;
pub mod service;

use std::sync::Arc;

use dredge_core::config::{AppConfig, AuthMethod, ConfigError};
use dredge_core::error::Error;

pub use delegated::DelegatedTokenAuth;
pub use service::{BasicServiceAuth, ClientCredentialAuth};

/// Per-request credentials resolved by a strategy.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Header name/value pairs to attach to the request.
    pub headers: Vec<(String, String)>,
    /// Base URL for this request.
    pub base_url: String,
}

impl Credentials {
    /// Attach the auth headers to a request.
    pub fn apply(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

/// Auth strategy interface; selected at construction, not via
/// inheritance.
#[async_trait::async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Auth headers for one request.
    async fn headers(&self, token: Option<&str>) -> Result<Vec<(String, String)>, Error>;

    /// Base URL for one request.
    async fn base_url(&self, token: Option<&str>) -> Result<String, Error>;

    /// Resolve both in one step.
    async fn credentials(&self, token: Option<&str>) -> Result<Credentials, Error> {
        Ok(Credentials { headers: self.headers(token).await?, base_url: self.base_url(token).await? })
    }

    /// Drop any cached upstream token so the next call re-authenticates.
    /// No-op for strategies without refreshable state.
    async fn invalidate(&self) {}
}

/// Provider-specific endpoints consumed by strategy construction.
///
/// Each provider module supplies one of these; the selected strategy
/// uses the subset it needs.
#[derive(Debug, Clone, Default)]
pub struct AuthEndpoints {
    /// "Accessible resources" endpoint for tenant resolution
    /// (delegated strategy). When absent, the delegated strategy uses
    /// the static base URL instead.
    pub resources_url: Option<String>,
    /// Per-tenant base URL template; `{org_id}` is substituted with
    /// the resolved tenant id.
    pub tenant_base_url: Option<String>,
    /// OAuth2 token endpoint template; `{tenant_id}` is substituted
    /// (client-credential strategy).
    pub token_url: Option<String>,
    /// Scope requested during the client-credential exchange.
    pub token_scope: Option<String>,
    /// Provider base URL used when the configuration sets none.
    pub default_base_url: Option<String>,
}

/// Construct the auth strategy selected by configuration.
///
/// # Errors
///
/// Returns `ConfigError` when a setting the selected strategy requires
/// is absent. This is the fail-fast point: nothing is deferred to the
/// first request.
pub fn from_config(
    http: &reqwest::Client, config: &AppConfig, endpoints: &AuthEndpoints,
) -> Result<Arc<dyn AuthStrategy>, ConfigError> {
    match config.auth_method {
        AuthMethod::Delegated => {
            let static_base = config.product_url.clone().or_else(|| endpoints.default_base_url.clone());
            let strategy = match (&endpoints.resources_url, &endpoints.tenant_base_url) {
                (Some(resources_url), Some(template)) => DelegatedTokenAuth::with_tenant_resolution(
                    http.clone(),
                    resources_url.clone(),
                    template.clone(),
                ),
                _ => {
                    let base_url = static_base.ok_or_else(|| ConfigError::Missing {
                        field: "product_url".into(),
                        hint: "set DREDGE_PRODUCT_URL for delegated auth without tenant resolution".into(),
                    })?;
                    DelegatedTokenAuth::with_static_base(base_url)
                }
            };
            Ok(Arc::new(strategy))
        }
        AuthMethod::Service => {
            let base_url = AppConfig::require(&config.product_url, "product_url", "set DREDGE_PRODUCT_URL")?;
            let user = AppConfig::require(&config.service_user, "service_user", "set DREDGE_SERVICE_USER")?;
            let secret = AppConfig::require(&config.service_secret, "service_secret", "set DREDGE_SERVICE_SECRET")?;
            Ok(Arc::new(BasicServiceAuth::new(base_url, &user, &secret)))
        }
        AuthMethod::ClientCredential => {
            let tenant_id = AppConfig::require(&config.tenant_id, "tenant_id", "set DREDGE_TENANT_ID")?;
            let client_id = AppConfig::require(&config.client_id, "client_id", "set DREDGE_CLIENT_ID")?;
            let client_secret =
                AppConfig::require(&config.client_secret, "client_secret", "set DREDGE_CLIENT_SECRET")?;

            let token_url_template = endpoints.token_url.clone().ok_or_else(|| ConfigError::Invalid {
                field: "auth_method".into(),
                reason: "provider does not support client-credential auth".into(),
            })?;
            let scope = endpoints.token_scope.clone().unwrap_or_default();
            let base_url = config
                .product_url
                .clone()
                .or_else(|| endpoints.default_base_url.clone())
                .ok_or_else(|| ConfigError::Missing {
                    field: "product_url".into(),
                    hint: "set DREDGE_PRODUCT_URL".into(),
                })?;

            let token_url = token_url_template.replace("{tenant_id}", &tenant_id);
            Ok(Arc::new(ClientCredentialAuth::new(http.clone(), token_url, client_id, client_secret, scope, base_url)))
        }
    }
}
