//! Search provider implementations.
//!
//! `build(config, keys)` is the factory: every provider with an API key is
//! enabled. Adding a backend = new module + new variant + new match arms.

pub mod brave;
pub mod fixed;
pub mod serpapi;

use reqwest::Client;

use crate::config::{ApiKeys, SearchConfig};
use crate::error::ProviderError;
use crate::ledger::Provider;

/// Provider-neutral hit, scored later by the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// 1-based rank, when the provider reports one.
    pub position: Option<u32>,
}

/// Providers cap page size at 20.
pub(crate) const MAX_PAGE_SIZE: usize = 20;

/// All available search backends.
///
/// Enum dispatch avoids `dyn` trait objects for async calls.
#[derive(Debug, Clone)]
pub enum SearchProvider {
    Brave(brave::BraveSearch),
    SerpApi(serpapi::SerpApiSearch),
    Fixed(fixed::FixedSearch),
}

impl SearchProvider {
    pub fn name(&self) -> &str {
        match self {
            SearchProvider::Brave(_) => "brave",
            SearchProvider::SerpApi(_) => "serpapi",
            SearchProvider::Fixed(p) => p.name(),
        }
    }

    /// Ledger provider charged one unit per successful call.
    pub fn billing(&self) -> Option<Provider> {
        match self {
            SearchProvider::Brave(_) => Some(Provider::BraveSearch),
            SearchProvider::SerpApi(_) => Some(Provider::SerpApi),
            SearchProvider::Fixed(p) => p.billing(),
        }
    }

    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, ProviderError> {
        match self {
            SearchProvider::Brave(p) => p.search(query, max_results).await,
            SearchProvider::SerpApi(p) => p.search(query, max_results).await,
            SearchProvider::Fixed(p) => p.search(query, max_results).await,
        }
    }
}

/// Enable every provider whose API key is present.
pub fn build(config: &SearchConfig, keys: &ApiKeys) -> Result<Vec<SearchProvider>, ProviderError> {
    let client = Client::builder()
        .timeout(config.provider_timeout)
        .build()
        .map_err(|e| ProviderError::Http(format!("failed to build HTTP client: {e}")))?;

    let mut providers = Vec::new();
    if let Some(key) = &keys.brave {
        providers.push(SearchProvider::Brave(brave::BraveSearch::new(
            client.clone(),
            config.brave_url.clone(),
            key.clone(),
        )));
    }
    if let Some(key) = &keys.serpapi {
        providers.push(SearchProvider::SerpApi(serpapi::SerpApiSearch::new(
            client,
            config.serpapi_url.clone(),
            key.clone(),
        )));
    }
    Ok(providers)
}

/// Return the response if successful, else a status error with a body excerpt.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    let excerpt: String = body.chars().take(200).collect();
    Err(ProviderError::Status { status: status.as_u16(), body: excerpt })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn providers_follow_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        assert!(build(&cfg.search, &ApiKeys::default()).unwrap().is_empty());

        let keys = ApiKeys { brave: Some("b".into()), serpapi: Some("s".into()), proxy: None };
        let providers = build(&cfg.search, &keys).unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["brave", "serpapi"]);
        assert_eq!(providers[1].billing(), Some(Provider::SerpApi));
    }
}
