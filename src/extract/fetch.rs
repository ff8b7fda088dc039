//! Page fetchers.
//!
//! Sources are tried in order until one returns a body: the rendering proxy
//! (only when a key is configured), then a direct GET with browser headers.
//! `Fixed` serves canned pages for offline runs and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::{ApiKeys, ExtractConfig};
use crate::error::ProviderError;
use crate::ledger::Provider;
use crate::search::providers::check_status;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Clone)]
pub enum PageSource {
    Proxy(ProxyFetch),
    Direct(DirectFetch),
    Fixed(FixedPages),
}

impl PageSource {
    pub fn name(&self) -> &'static str {
        match self {
            PageSource::Proxy(_) => "proxy",
            PageSource::Direct(_) => "direct",
            PageSource::Fixed(_) => "fixed",
        }
    }

    /// Ledger provider charged one unit per successful fetch.
    pub fn billing(&self) -> Option<Provider> {
        match self {
            PageSource::Proxy(_) => Some(Provider::ContentProxy),
            PageSource::Direct(_) | PageSource::Fixed(_) => None,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        match self {
            PageSource::Proxy(p) => p.fetch(url).await,
            PageSource::Direct(p) => p.fetch(url).await,
            PageSource::Fixed(p) => p.fetch(url).await,
        }
    }
}

/// Proxy (when keyed) followed by direct fetch. The proxy client is capped
/// at `source_timeout` so the direct fetch always gets a turn.
pub fn build(config: &ExtractConfig, keys: &ApiKeys) -> Result<Vec<PageSource>, ProviderError> {
    let mut sources = Vec::new();
    if let Some(key) = &keys.proxy {
        sources.push(PageSource::Proxy(ProxyFetch {
            client: http_client(config.source_timeout)?,
            url: config.proxy_url.clone(),
            api_key: key.clone(),
        }));
    }
    sources.push(PageSource::Direct(DirectFetch { client: http_client(config.fetch_timeout)? }));
    Ok(sources)
}

fn http_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Http(format!("failed to build HTTP client: {e}")))
}

// ── Proxy ─────────────────────────────────────────────────────────────────────

/// JavaScript-rendering scraping proxy (ZenRows-compatible query API).
#[derive(Clone)]
pub struct ProxyFetch {
    client: Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for ProxyFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyFetch").field("url", &self.url).finish_non_exhaustive()
    }
}

impl ProxyFetch {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("url", url),
                ("apikey", self.api_key.as_str()),
                ("js_render", "true"),
                ("premium_proxy", "true"),
                ("proxy_country", "US"),
                ("wait", "2"),
            ])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        debug!(url, bytes = body.len(), "proxy fetch ok");
        Ok(body)
    }
}

// ── Direct ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DirectFetch {
    client: Client,
}

impl DirectFetch {
    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Accept", BROWSER_ACCEPT)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        debug!(url, bytes = body.len(), "direct fetch ok");
        Ok(body)
    }
}

// ── Fixed ─────────────────────────────────────────────────────────────────────

/// Canned URL → HTML map. Unknown URLs answer 404.
#[derive(Debug, Clone, Default)]
pub struct FixedPages {
    pages: Arc<HashMap<String, String>>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FixedPages {
    pub fn new(pages: impl IntoIterator<Item = (String, String)>) -> Self {
        Self { pages: Arc::new(pages.into_iter().collect()), delay: None, calls: Arc::default() }
    }

    /// Sleep before answering, like a page or proxy that stalls.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fetches attempted so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    async fn fetch(&self, url: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ProviderError::Status { status: 404, body: format!("no page for {url}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn proxy_only_with_key() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let names = |s: Vec<PageSource>| s.iter().map(|p| p.name()).collect::<Vec<_>>();

        assert_eq!(names(build(&cfg.extract, &ApiKeys::default()).unwrap()), vec!["direct"]);
        let keys = ApiKeys { proxy: Some("z".into()), ..ApiKeys::default() };
        let sources = build(&cfg.extract, &keys).unwrap();
        assert_eq!(sources[0].billing(), Some(Provider::ContentProxy));
        assert_eq!(names(sources), vec!["proxy", "direct"]);
    }

    #[tokio::test]
    async fn fixed_pages_serve_known_urls() {
        let pages = FixedPages::new([("https://a".to_string(), "<p>a</p>".to_string())]);
        let source = PageSource::Fixed(pages.clone());
        assert_eq!(source.fetch("https://a").await.unwrap(), "<p>a</p>");
        assert!(matches!(
            source.fetch("https://b").await,
            Err(ProviderError::Status { status: 404, .. })
        ));
        assert_eq!(pages.calls(), 2);
    }
}
