//! SerpApi Google search (`/search?engine=google`).

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{MAX_PAGE_SIZE, RawHit, check_status};
use crate::error::ProviderError;

#[derive(Clone)]
pub struct SerpApiSearch {
    client: Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for SerpApiSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerpApiSearch").field("url", &self.url).finish_non_exhaustive()
    }
}

impl SerpApiSearch {
    pub fn new(client: Client, url: String, api_key: String) -> Self {
        Self { client, url, api_key }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, ProviderError> {
        let num = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
                ("num", num.as_str()),
                ("hl", "en"),
                ("gl", "us"),
                ("safe", "active"),
                ("output", "json"),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: SerpResponse =
            response.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        let hits = into_hits(body);
        debug!(query, hits = hits.len(), "serpapi search returned");
        Ok(hits)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SerpResponse {
    #[serde(default)]
    organic_results: Vec<SerpItem>,
}

#[derive(Debug, Deserialize)]
struct SerpItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    position: Option<u32>,
}

fn into_hits(body: SerpResponse) -> Vec<RawHit> {
    body.organic_results
        .into_iter()
        .filter(|item| !item.link.is_empty())
        .map(|item| RawHit {
            title: item.title,
            url: item.link,
            snippet: item.snippet,
            position: item.position,
        })
        .collect()
}
