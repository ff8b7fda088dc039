//! Search aggregator.
//!
//! Fans out one call per (query × provider) pair, each bounded by the
//! provider timeout. A failing call contributes nothing; it never aborts the
//! aggregate. Results are scored, de-duplicated by URL and cut to
//! `max_results_per_query × queries`.

pub mod providers;
pub mod rank;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::{Cache, Namespace};
use crate::error::ProviderError;
use crate::health::{Component, ComponentHealth};
use crate::ledger::Meter;
use crate::types::SearchResult;
use providers::SearchProvider;

pub struct SearchAggregator {
    providers: Vec<SearchProvider>,
    cache: Arc<Cache>,
    call_timeout: Duration,
}

impl SearchAggregator {
    pub fn new(providers: Vec<SearchProvider>, cache: Arc<Cache>, call_timeout: Duration) -> Self {
        if providers.is_empty() {
            warn!("no search providers configured; searches will return nothing");
        }
        Self { providers, cache, call_timeout }
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub async fn search(
        &self,
        queries: &[String],
        max_results_per_query: usize,
        meter: &Meter,
    ) -> Vec<SearchResult> {
        let started = Instant::now();
        let per_query = join_all(
            queries.iter().map(|q| self.search_query(q, max_results_per_query, meter)),
        )
        .await;

        let limit = max_results_per_query.saturating_mul(queries.len().max(1));
        let results = rank::dedup_and_rank(per_query.into_iter().flatten().collect(), limit);
        info!(
            queries = queries.len(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search completed"
        );
        results
    }

    /// All providers for one query; cached per query.
    async fn search_query(&self, query: &str, max_results: usize, meter: &Meter) -> Vec<SearchResult> {
        let subject = format!("{max_results}:{query}");
        if let Some(cached) = self.cache.get_json::<Vec<SearchResult>>(&subject, Namespace::Search).await {
            debug!(query, results = cached.len(), "search cache hit");
            return cached;
        }

        let calls = self.providers.iter().map(|p| self.call_provider(p, query, max_results, meter));
        let mut results = Vec::new();
        let mut any_ok = false;
        for outcome in join_all(calls).await {
            if let Some(hits) = outcome {
                any_ok = true;
                results.extend(hits);
            }
        }

        if any_ok && !results.is_empty() {
            self.cache.set_json(&subject, &results, None, Namespace::Search).await;
        }
        results
    }

    async fn call_provider(
        &self,
        provider: &SearchProvider,
        query: &str,
        max_results: usize,
        meter: &Meter,
    ) -> Option<Vec<SearchResult>> {
        let outcome = tokio::time::timeout(self.call_timeout, provider.search(query, max_results))
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.call_timeout)));
        match outcome {
            Ok(hits) => {
                if let Some(billed) = provider.billing() {
                    meter.track(billed, 1);
                }
                Some(
                    hits.into_iter()
                        .map(|hit| SearchResult {
                            relevance_score: rank::relevance_score(
                                &hit.title,
                                &hit.snippet,
                                query,
                                hit.position,
                            ),
                            title: hit.title,
                            url: hit.url,
                            snippet: hit.snippet,
                            source_engine: provider.name().to_string(),
                        })
                        .collect(),
                )
            }
            Err(e) => {
                warn!(provider = provider.name(), query, error = %e, "search provider failed");
                None
            }
        }
    }

    /// Configuration-only check; probing live providers would bill them.
    pub async fn health(&self) -> ComponentHealth {
        let names = self.provider_names();
        let details = serde_json::json!({ "providers": names });
        match names.len() {
            0 => ComponentHealth::unhealthy(Component::Search, "no search providers configured"),
            1 => ComponentHealth::degraded(Component::Search, "single search provider").with_details(details),
            _ => ComponentHealth::ok(Component::Search).with_details(details),
        }
    }
}
