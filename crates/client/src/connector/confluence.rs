//! Confluence Cloud provider.
//!
//! Search goes through the CQL endpoint; page content comes from the
//! v2 pages API with storage-format bodies. The final page URL is only
//! known after the content call, so it travels in [`FetchedContent`].

use serde::Deserialize;

use dredge_core::error::Error;

use super::{FetchedContent, Provider, SearchHit, ensure_success, transport_error};
use crate::auth::{AuthEndpoints, Credentials};

const ACCESSIBLE_RESOURCES_URL: &str = "https://api.atlassian.com/oauth/token/accessible-resources";
const TENANT_BASE_URL: &str = "https://api.atlassian.com/ex/confluence/{org_id}";
const PAGE_BODY_FORMAT: &str = "storage";

pub struct ConfluenceProvider;

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Page {
    title: String,
    body: PageBody,
    #[serde(rename = "_links")]
    links: PageLinks,
}

#[derive(Deserialize)]
struct PageBody {
    storage: PageBodyValue,
}

#[derive(Deserialize)]
struct PageBodyValue {
    value: String,
}

#[derive(Deserialize)]
struct PageLinks {
    webui: String,
}

fn collect_hits(results: Vec<serde_json::Value>) -> Vec<SearchHit> {
    results
        .into_iter()
        .filter_map(|result| {
            // Content ids arrive as strings, but tolerate numbers.
            let id = match result.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => {
                    tracing::debug!("dropping search result without id");
                    return None;
                }
            };

            Some(SearchHit {
                id,
                title: result.get("title").and_then(serde_json::Value::as_str).map(str::to_string),
                url: None,
                kind: result.get("type").and_then(serde_json::Value::as_str).map(str::to_string),
                raw: result,
            })
        })
        .collect()
}

#[async_trait::async_trait]
impl Provider for ConfluenceProvider {
    fn name(&self) -> &'static str {
        "confluence"
    }

    fn auth_endpoints(&self) -> AuthEndpoints {
        AuthEndpoints {
            resources_url: Some(ACCESSIBLE_RESOURCES_URL.to_string()),
            tenant_base_url: Some(TENANT_BASE_URL.to_string()),
            ..Default::default()
        }
    }

    async fn search(
        &self, http: &reqwest::Client, creds: &Credentials, query: &str, limit: usize,
    ) -> Result<Vec<SearchHit>, Error> {
        let url = format!("{}/wiki/rest/api/content/search", creds.base_url);

        let response = creds
            .apply(http.get(&url))
            .query(&[("cql", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let parsed: SearchResponse = response.json().await.map_err(transport_error)?;
        Ok(collect_hits(parsed.results))
    }

    /// Only content search results carrying a type are pages worth
    /// fetching; attachments and spaces are skipped.
    fn recognizes(&self, hit: &SearchHit) -> bool {
        hit.kind.is_some()
    }

    async fn fetch_content(
        &self, http: &reqwest::Client, creds: &Credentials, hit: &SearchHit,
    ) -> Result<FetchedContent, Error> {
        let url = format!("{}/wiki/api/v2/pages/{}", creds.base_url, hit.id);

        let response = creds
            .apply(http.get(&url))
            .query(&[("body-format", PAGE_BODY_FORMAT)])
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;

        let page: Page = response.json().await.map_err(transport_error)?;
        let page_url = format!("{}/wiki{}", creds.base_url, page.links.webui);

        Ok(FetchedContent { text: page.body.storage.value, title: Some(page.title), url: Some(page_url) })
    }
}
