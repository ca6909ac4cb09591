//! Service-credential strategies: a fixed account instead of a
//! per-request user token.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::Mutex;

use dredge_core::error::Error;

use crate::auth::AuthStrategy;

/// HTTP Basic auth from static service-account credentials.
///
/// The `Authorization` header is constant for the process lifetime, as
/// is the base URL.
pub struct BasicServiceAuth {
    base_url: String,
    authorization: String,
}

impl BasicServiceAuth {
    pub fn new(base_url: String, user: &str, secret: &str) -> Self {
        let encoded = BASE64.encode(format!("{user}:{secret}"));
        Self { base_url, authorization: format!("Basic {encoded}") }
    }
}

#[async_trait::async_trait]
impl AuthStrategy for BasicServiceAuth {
    async fn headers(&self, _token: Option<&str>) -> Result<Vec<(String, String)>, Error> {
        Ok(vec![("Authorization".to_string(), self.authorization.clone())])
    }

    async fn base_url(&self, _token: Option<&str>) -> Result<String, Error> {
        Ok(self.base_url.clone())
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth2 client-credential strategy with a lazily exchanged token.
///
/// Refresh policy: the token is exchanged on first use, cached, and
/// reused until [`AuthStrategy::invalidate`] drops it — callers do that
/// when an upstream call answers 401. There is no proactive refresh
/// scheduling and no expiry tracking.
pub struct ClientCredentialAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    scope: String,
    base_url: String,
    cached_token: Mutex<Option<String>>,
}

impl ClientCredentialAuth {
    pub fn new(
        http: reqwest::Client, token_url: String, client_id: String, client_secret: String, scope: String,
        base_url: String,
    ) -> Self {
        Self { http, token_url, client_id, client_secret, scope, base_url, cached_token: Mutex::new(None) }
    }

    /// Exchange client credentials for an access token.
    ///
    /// The cache lock is held across the exchange so concurrent first
    /// uses perform it once.
    async fn access_token(&self) -> Result<String, Error> {
        let mut cached = self.cached_token.lock().await;

        if let Some(token) = cached.as_deref() {
            return Ok(token.to_string());
        }

        tracing::debug!("exchanging client credentials at {}", self.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token exchange failed: status {status}: {body}")));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed token response: {e}")))?;

        *cached = Some(token_response.access_token.clone());
        Ok(token_response.access_token)
    }
}

#[async_trait::async_trait]
impl AuthStrategy for ClientCredentialAuth {
    async fn headers(&self, _token: Option<&str>) -> Result<Vec<(String, String)>, Error> {
        let token = self.access_token().await?;
        Ok(vec![("Authorization".to_string(), format!("Bearer {token}"))])
    }

    async fn base_url(&self, _token: Option<&str>) -> Result<String, Error> {
        Ok(self.base_url.clone())
    }

    async fn invalidate(&self) {
        let mut cached = self.cached_token.lock().await;
        if cached.take().is_some() {
            tracing::debug!("dropped cached service token after upstream rejection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_header_encoding() {
        let auth = BasicServiceAuth::new("https://example.atlassian.net".into(), "bot@example.com", "s3cret");
        let headers = auth.headers(None).await.unwrap();

        // base64("bot@example.com:s3cret")
        assert_eq!(headers[0].0, "Authorization");
        assert_eq!(headers[0].1, "Basic Ym90QGV4YW1wbGUuY29tOnMzY3JldA==");
    }

    #[tokio::test]
    async fn test_basic_base_url_static() {
        let auth = BasicServiceAuth::new("https://example.atlassian.net".into(), "u", "s");
        assert_eq!(auth.base_url(Some("ignored")).await.unwrap(), "https://example.atlassian.net");
    }

    #[tokio::test]
    async fn test_client_credential_invalidate_clears_cache() {
        let auth = ClientCredentialAuth::new(
            reqwest::Client::new(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token".into(),
            "id".into(),
            "secret".into(),
            "https://graph.microsoft.com/.default".into(),
            "https://graph.microsoft.com/v1.0".into(),
        );

        *auth.cached_token.lock().await = Some("stale".into());
        auth.invalidate().await;
        assert!(auth.cached_token.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_client_credential_reuses_cached_token() {
        let auth = ClientCredentialAuth::new(
            reqwest::Client::new(),
            // Never reached: the cached token short-circuits the exchange.
            "http://127.0.0.1:1/token".into(),
            "id".into(),
            "secret".into(),
            String::new(),
            "https://graph.microsoft.com/v1.0".into(),
        );

        *auth.cached_token.lock().await = Some("cached-token".into());
        let headers = auth.headers(None).await.unwrap();
        assert_eq!(headers[0].1, "Bearer cached-token");
    }
}
