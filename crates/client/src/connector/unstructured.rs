//! Document-extraction service client.
//!
//! A separate enrichment step: already-fetched file bytes are posted
//! as multipart uploads to the extraction endpoint, which answers with
//! a list of text elements. Extraction is slow (the timeout budget is
//! an hour), so results are cached by file id and the fan-out runs
//! through the same [`ContentFetcher`] the search path uses.

use std::collections::HashMap;

use dredge_core::cache::backend_from_config;
use dredge_core::config::{AppConfig, ConfigError};
use dredge_core::error::Error;

use super::{ensure_success, transport_error};
use crate::fetch::ContentFetcher;

const GENERAL_ENDPOINT: &str = "/general/v0/general";
const API_KEY_HEADER: &str = "unstructured-api-key";

/// One file to run through extraction.
pub struct ExtractFile {
    pub id: String,
    pub name: String,
    pub data: Vec<u8>,
}

pub struct UnstructuredClient {
    http: reqwest::Client,
    get_content_url: String,
    api_key: Option<String>,
    fetcher: ContentFetcher,
}

impl std::fmt::Debug for UnstructuredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnstructuredClient")
            .field("get_content_url", &self.get_content_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl UnstructuredClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>, fetcher: ContentFetcher) -> Self {
        Self { http, get_content_url: format!("{}{}", base_url.trim_end_matches('/'), GENERAL_ENDPOINT), api_key, fetcher }
    }

    /// Build from configuration with a dedicated HTTP client, since the
    /// extraction timeout is far beyond the search client's budget.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let base_url = config.extract_base_url.clone().ok_or_else(|| ConfigError::Missing {
            field: "extract_base_url".into(),
            hint: "set DREDGE_EXTRACT_BASE_URL to enable document extraction".into(),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.extract_timeout())
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        let cache = backend_from_config(config).await?;
        let fetcher = ContentFetcher::new(cache, config.max_concurrency, config.extract_timeout());

        Ok(Self::new(http, &base_url, config.extract_api_key.clone(), fetcher))
    }

    /// Extract text for every file, keyed by file id. Files whose
    /// extraction fails or times out are absent from the result.
    pub async fn extract_all(&self, files: Vec<ExtractFile>) -> HashMap<String, String> {
        let items: Vec<(String, ExtractFile)> = files.into_iter().map(|file| (file.id.clone(), file)).collect();

        let http = self.http.clone();
        let url = self.get_content_url.clone();
        let api_key = self.api_key.clone();

        self.fetcher
            .fetch_all(items, move |file: ExtractFile| {
                let http = http.clone();
                let url = url.clone();
                let api_key = api_key.clone();
                async move { extract_one(&http, &url, api_key.as_deref(), file).await }
            })
            .await
    }
}

async fn extract_one(
    http: &reqwest::Client, url: &str, api_key: Option<&str>, file: ExtractFile,
) -> Result<String, Error> {
    tracing::debug!("extracting {}", file.name);

    let part = reqwest::multipart::Part::bytes(file.data).file_name(file.name);
    let form = reqwest::multipart::Form::new().part("files", part);

    let mut request = http.post(url).multipart(form);
    if let Some(key) = api_key {
        request = request.header(API_KEY_HEADER, key);
    }

    let response = request.send().await.map_err(transport_error)?;
    let response = ensure_success(response).await?;

    let body = response.text().await.map_err(transport_error)?;
    Ok(element_text(&body))
}

/// Join the `text` fields of the element list the service answers
/// with. Anything unexpected passes through verbatim.
fn element_text(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(elements)) => {
            let texts: Vec<&str> =
                elements.iter().filter_map(|e| e.get("text").and_then(serde_json::Value::as_str)).collect();
            texts.join("\n")
        }
        _ => body.to_string(),
    }
}
