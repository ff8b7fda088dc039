//! Brave web search (`/res/v1/web/search`).

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{MAX_PAGE_SIZE, RawHit, check_status};
use crate::error::ProviderError;

#[derive(Clone)]
pub struct BraveSearch {
    client: Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for BraveSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BraveSearch").field("url", &self.url).finish_non_exhaustive()
    }
}

impl BraveSearch {
    pub fn new(client: Client, url: String, api_key: String) -> Self {
        Self { client, url, api_key }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, ProviderError> {
        let count = max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("search_lang", "en"),
                ("country", "US"),
                ("safesearch", "moderate"),
            ])
            .send()
            .await?;
        let response = check_status(response).await?;
        let body: BraveResponse =
            response.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        let hits = into_hits(body);
        debug!(query, hits = hits.len(), "brave search returned");
        Ok(hits)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize, Default)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveItem>,
}

#[derive(Debug, Deserialize)]
struct BraveItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Brave reports no rank, so no position bonus applies.
fn into_hits(body: BraveResponse) -> Vec<RawHit> {
    body.web
        .unwrap_or_default()
        .results
        .into_iter()
        .filter(|item| !item.url.is_empty())
        .map(|item| RawHit {
            title: item.title,
            url: item.url,
            snippet: item.description,
            position: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_results() {
        let body: BraveResponse = serde_json::from_str(
            r#"{"web":{"results":[
                {"title":"A","url":"https://a.example","description":"first"},
                {"title":"no url"}
            ]}}"#,
        )
        .unwrap();
        let hits = into_hits(body);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "first");
        assert_eq!(hits[0].position, None);
    }

    #[test]
    fn missing_web_section_is_empty() {
        let body: BraveResponse = serde_json::from_str(r#"{"query":{}}"#).unwrap();
        assert!(into_hits(body).is_empty());
    }
}
