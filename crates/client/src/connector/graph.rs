//! Microsoft Graph drive-item provider.
//!
//! Search posts to the Graph search endpoint and flattens the nested
//! `value[].hitsContainers[].hits[]` response into hits. Only drive
//! items with a usable file extension are fetched; their raw bytes are
//! decoded lossily to UTF-8.

use dredge_core::config::{AppConfig, AuthMethod};
use dredge_core::error::Error;

use super::{FetchedContent, Provider, SearchHit, ensure_success, transport_error};
use crate::auth::{AuthEndpoints, Credentials};

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const TOKEN_URL: &str = "https://login.microsoftonline.com/{tenant_id}/oauth2/v2.0/token";
const TOKEN_SCOPE: &str = "https://graph.microsoft.com/.default";
const DRIVE_ITEM_DATA_TYPE: &str = "#microsoft.graph.driveItem";
/// Region is mandatory for application-permission searches.
const DEFAULT_REGION: &str = "NAM";

pub struct GraphProvider {
    /// Lowercased extensions (leading dot) accepted for fetch; empty
    /// means any file with an extension.
    allowed_extensions: Vec<String>,
    region: Option<String>,
}

impl GraphProvider {
    pub fn new(allowed_extensions: Vec<String>, region: Option<String>) -> Self {
        let allowed_extensions = allowed_extensions.iter().map(|ext| normalize_extension(ext)).collect();
        Self { allowed_extensions, region }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let extensions =
            config.passthrough_file_types.iter().chain(&config.extractable_file_types).cloned().collect();
        let region =
            matches!(config.auth_method, AuthMethod::ClientCredential).then(|| DEFAULT_REGION.to_string());
        Self::new(extensions, region)
    }

    fn extension_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions.is_empty() || self.allowed_extensions.iter().any(|e| e == extension)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') { ext } else { format!(".{ext}") }
}

/// Extension including the leading dot; `None` for dotless names and
/// dotfiles.
fn file_extension(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot..].to_ascii_lowercase())
}

fn flatten_hits(response: &serde_json::Value) -> Vec<SearchHit> {
    let containers = response
        .get("value")
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("hitsContainers").and_then(serde_json::Value::as_array))
        .flatten();

    let mut hits = Vec::new();
    for container in containers {
        let Some(container_hits) = container.get("hits").and_then(serde_json::Value::as_array) else {
            continue;
        };
        for hit in container_hits {
            let Some(resource) = hit.get("resource") else {
                continue;
            };
            let Some(id) = resource.get("id").and_then(serde_json::Value::as_str) else {
                tracing::debug!("dropping search hit without resource id");
                continue;
            };

            hits.push(SearchHit {
                id: id.to_string(),
                title: resource.get("name").and_then(serde_json::Value::as_str).map(str::to_string),
                url: resource.get("webUrl").and_then(serde_json::Value::as_str).map(str::to_string),
                kind: resource.get("@odata.type").and_then(serde_json::Value::as_str).map(str::to_string),
                raw: resource.clone(),
            });
        }
    }

    hits
}

#[async_trait::async_trait]
impl Provider for GraphProvider {
    fn name(&self) -> &'static str {
        "graph"
    }

    fn auth_endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            token_url: Some(TOKEN_URL.to_string()),
            token_scope: Some(TOKEN_SCOPE.to_string()),
            default_base_url: Some(DEFAULT_BASE_URL.to_string()),
            ..Default::default()
        }
    }

    async fn search(
        &self, http: &reqwest::Client, creds: &Credentials, query: &str, limit: usize,
    ) -> Result<Vec<SearchHit>, Error> {
        let url = format!("{}/search/query", creds.base_url);

        let mut request = serde_json::json!({
            "entityTypes": ["driveItem"],
            "query": {
                "queryString": query,
                "size": limit,
            },
        });
        if let Some(region) = &self.region {
            request["region"] = serde_json::Value::String(region.clone());
        }

        let response = creds
            .apply(http.post(&url))
            .json(&serde_json::json!({ "requests": [request] }))
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let parsed: serde_json::Value = response.json().await.map_err(transport_error)?;
        Ok(flatten_hits(&parsed))
    }

    fn recognizes(&self, hit: &SearchHit) -> bool {
        if hit.kind.as_deref() != Some(DRIVE_ITEM_DATA_TYPE) {
            return false;
        }
        let Some(extension) = hit.title.as_deref().and_then(file_extension) else {
            return false;
        };
        self.extension_allowed(&extension)
    }

    async fn fetch_content(
        &self, http: &reqwest::Client, creds: &Credentials, hit: &SearchHit,
    ) -> Result<FetchedContent, Error> {
        let drive_id = hit
            .raw
            .pointer("/parentReference/driveId")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::Http(format!("drive item {} has no parent drive id", hit.id)))?;

        let url = format!("{}/drives/{}/items/{}/content", creds.base_url, drive_id, hit.id);

        let response = creds.apply(http.get(&url)).send().await.map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(FetchedContent::text_only(String::from_utf8_lossy(&bytes).into_owned()))
    }
}
