//! Content extractor.
//!
//! For each search result: fetch the page through the first page source that
//! answers, extract text (article blocks, else tag stripping), clean it, then
//! score and categorise it. URLs that yield nothing are dropped.

pub mod classify;
pub mod clean;
pub mod fetch;
pub mod html;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{Cache, Namespace};
use crate::config::ExtractConfig;
use crate::health::{Component, ComponentHealth};
use crate::ledger::Meter;
use crate::types::{ContentRecord, ExtractionMethod, SearchResult};
use fetch::PageSource;

pub struct ContentExtractor {
    sources: Vec<PageSource>,
    cache: Arc<Cache>,
    fetch_timeout: Duration,
    source_timeout: Duration,
    max_content_length: usize,
}

impl ContentExtractor {
    pub fn new(config: &ExtractConfig, sources: Vec<PageSource>, cache: Arc<Cache>) -> Self {
        Self {
            sources,
            cache,
            fetch_timeout: config.fetch_timeout,
            source_timeout: config.source_timeout,
            max_content_length: config.max_content_length,
        }
    }

    /// Extract the first `max_urls` results concurrently.
    pub async fn fetch(&self, results: &[SearchResult], max_urls: usize, meter: &Meter) -> Vec<ContentRecord> {
        let started = Instant::now();
        let targets = &results[..results.len().min(max_urls)];
        let records: Vec<ContentRecord> =
            join_all(targets.iter().map(|r| self.fetch_one(r, meter))).await.into_iter().flatten().collect();
        info!(
            attempted = targets.len(),
            extracted = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "content extraction completed"
        );
        records
    }

    async fn fetch_one(&self, result: &SearchResult, meter: &Meter) -> Option<ContentRecord> {
        let url = result.url.as_str();
        if let Some(cached) = self.cache.get_json::<ContentRecord>(url, Namespace::Content).await {
            debug!(url, "content cache hit");
            return Some(cached);
        }

        let started = Instant::now();
        let Some(html) = self.fetch_html(url, meter).await else {
            warn!(url, "no page source could fetch url");
            return None;
        };

        let record = self.build_record(result, &html, started.elapsed().as_secs_f64());
        match &record {
            Some(record) => {
                self.cache.set_json(url, record, None, Namespace::Content).await;
                debug!(url, words = record.word_count, method = ?record.extraction_method, "content extracted");
            }
            None => warn!(url, "no text extracted"),
        }
        record
    }

    /// First source that answers wins; failures and timeouts fall through
    /// to the next. All attempts share `fetch_timeout`, and every source but
    /// the last is cut off at `source_timeout`.
    async fn fetch_html(&self, url: &str, meter: &Meter) -> Option<String> {
        let deadline = tokio::time::Instant::now() + self.fetch_timeout;
        let last = self.sources.len().saturating_sub(1);
        for (i, source) in self.sources.iter().enumerate() {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                warn!(url, timeout_ms = self.fetch_timeout.as_millis() as u64, "page fetch budget spent");
                break;
            }
            let limit = if i < last { remaining.min(self.source_timeout) } else { remaining };
            match tokio::time::timeout(limit, source.fetch(url)).await {
                Ok(Ok(body)) => {
                    if let Some(billed) = source.billing() {
                        meter.track(billed, 1);
                    }
                    return Some(body);
                }
                Ok(Err(e)) => debug!(url, source = source.name(), error = %e, "page source failed"),
                Err(_) => warn!(
                    url,
                    source = source.name(),
                    timeout_ms = limit.as_millis() as u64,
                    "page source timed out, trying next"
                ),
            }
        }
        None
    }

    fn build_record(&self, result: &SearchResult, html: &str, fetch_time_seconds: f64) -> Option<ContentRecord> {
        let document = html::parse(html);
        let (extracted, method) = match html::extract_article(&document) {
            Some(article) => (article, ExtractionMethod::Article),
            None => (html::extract_tag_strip(&document), ExtractionMethod::TagStrip),
        };

        let text = clean::clean(&extracted.text, self.max_content_length);
        if text.is_empty() {
            return None;
        }
        let title = if result.title.trim().is_empty() { extracted.title } else { result.title.clone() };

        Some(ContentRecord {
            word_count: text.split_whitespace().count(),
            source_category: classify::categorize(&result.url, &title),
            confidence: classify::content_confidence(&text, &title),
            extraction_method: method,
            url: result.url.clone(),
            title,
            text,
            fetch_time_seconds,
        })
    }

    /// Configuration-only: fetching a live page here would bill the proxy.
    pub async fn health(&self) -> ComponentHealth {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        let details = serde_json::json!({ "sources": names });
        if names.is_empty() {
            ComponentHealth::unhealthy(Component::Extractor, "no page sources configured")
        } else if names.contains(&"direct") && !names.contains(&"proxy") {
            ComponentHealth::degraded(Component::Extractor, "no rendering proxy; direct fetch only")
                .with_details(details)
        } else {
            ComponentHealth::ok(Component::Extractor).with_details(details)
        }
    }
}
