//! Query enhancement: turns one query into up to `max_variants` search
//! queries.
//!
//! Four strategies run concurrently and each contributes a capped number of
//! variants: autocomplete suggestions (3), semantic rewrites (2), a
//! domain-specific suffix (1) and a temporal hint (1). The original query is
//! always first. Results are cached in the `enhancement` namespace.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::cache::{Cache, Namespace};
use crate::config::EnhanceConfig;
use crate::error::ProviderError;
use crate::health::{Component, ComponentHealth};
use crate::search::providers::check_status;

const SUGGESTION_LIMIT: usize = 3;
const SEMANTIC_LIMIT: usize = 2;

const TECH_KEYWORDS: &[&str] = &["api", "code", "programming", "software", "algorithm", "tech"];
const BUSINESS_KEYWORDS: &[&str] = &["business", "strategy", "market", "company", "revenue"];
const ACADEMIC_KEYWORDS: &[&str] = &["research", "study", "analysis", "theory", "academic"];
const HEALTH_KEYWORDS: &[&str] = &["health", "medical", "disease", "treatment", "symptoms"];

const TEMPORAL_WORDS: &[&str] = &["recent", "latest", "current", "now", "today"];
const TIME_SENSITIVE_KEYWORDS: &[&str] =
    &["trends", "news", "updates", "development", "technology"];

pub struct QueryEnhancer {
    client: Client,
    config: EnhanceConfig,
    cache: Arc<Cache>,
}

impl QueryEnhancer {
    pub fn new(config: EnhanceConfig, cache: Arc<Cache>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.suggest_timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config, cache })
    }

    /// Original query first, then de-duplicated variants, at most
    /// `max_variants` in total. Never fails: strategy errors only shrink the
    /// list.
    pub async fn enhance(&self, query: &str) -> Vec<String> {
        if let Some(cached) = self.cache.get_json::<Vec<String>>(query, Namespace::Enhancement).await {
            if cached.first().is_some_and(|q| q == query) {
                debug!(query, "enhancement cache hit");
                return cached;
            }
        }

        let (suggestions, semantic, domain, temporal) = tokio::join!(
            self.autocomplete(query),
            async { semantic_variants(query) },
            async { domain_variant(query) },
            async { temporal_variant(query, Utc::now().year()) },
        );

        let suggestions = suggestions.unwrap_or_else(|e| {
            warn!(error = %e, "autocomplete failed");
            Vec::new()
        });

        let mut variants = vec![query.to_string()];
        for candidate in suggestions
            .into_iter()
            .chain(semantic)
            .chain(domain)
            .chain(temporal)
        {
            if variants.len() >= self.config.max_variants {
                break;
            }
            if !variants.iter().any(|v| v == &candidate) {
                variants.push(candidate);
            }
        }

        self.cache.set_json(query, &variants, None, Namespace::Enhancement).await;
        info!(query, variants = variants.len(), "query enhanced");
        variants
    }

    /// Top suggestions from the public suggestion endpoint, excluding the
    /// query itself.
    async fn autocomplete(&self, query: &str) -> Result<Vec<String>, ProviderError> {
        let Some(url) = &self.config.suggest_url else {
            return Ok(Vec::new());
        };
        let response = self
            .client
            .get(url)
            .query(&[("client", "chrome"), ("q", query), ("hl", "en"), ("gl", "us")])
            .send()
            .await?;
        let body: serde_json::Value =
            check_status(response).await?.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_suggestions(&body, query))
    }

    /// Offline self-test: the rule-based strategies must produce variants.
    pub async fn health(&self) -> ComponentHealth {
        let probe = "test query";
        let mut variants = vec![probe.to_string()];
        variants.extend(semantic_variants(probe));
        if variants.len() > 1 {
            ComponentHealth::ok(Component::Enhancer).with_details(serde_json::json!({
                "autocomplete": self.config.suggest_url.is_some(),
            }))
        } else {
            ComponentHealth::degraded(Component::Enhancer, "no variants produced")
        }
    }
}

/// `["query", ["s1", "s2", ...], ...]` → up to three suggestions.
fn parse_suggestions(body: &serde_json::Value, query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    body.get(1)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .take(SUGGESTION_LIMIT)
                .filter_map(|s| s.as_str())
                .filter(|s| s.to_lowercase() != lowered)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn semantic_variants(query: &str) -> Vec<String> {
    let mut out = Vec::new();
    if !query.trim_end().ends_with('?') {
        out.push(format!("what is {query}"));
        out.push(format!("how to {query}"));
        out.push(format!("{query} explained"));
    }
    let words: Vec<&str> = query.split_whitespace().collect();
    if words.len() > 1 {
        let broader = if words.len() > 2 { words[..words.len() - 1].join(" ") } else { words[0].to_string() };
        out.push(broader);
        out.push(format!("{query} guide"));
    }
    out.truncate(SEMANTIC_LIMIT);
    out
}

fn domain_variant(query: &str) -> Option<String> {
    let lowered = query.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));
    if matches(TECH_KEYWORDS) {
        Some(format!("{query} programming guide"))
    } else if matches(BUSINESS_KEYWORDS) {
        Some(format!("{query} analysis"))
    } else if matches(ACADEMIC_KEYWORDS) {
        Some(format!("{query} research paper"))
    } else if matches(HEALTH_KEYWORDS) {
        Some(format!("{query} medical information"))
    } else {
        None
    }
}

/// `"<query> <year>"` for time-sensitive queries that carry no temporal hint.
fn temporal_variant(query: &str, year: i32) -> Option<String> {
    let lowered = query.to_lowercase();
    let has_year = (year - 1..=year + 1).any(|y| lowered.contains(&y.to_string()));
    let has_temporal = has_year || TEMPORAL_WORDS.iter().any(|w| lowered.contains(w));
    if has_temporal {
        return None;
    }
    TIME_SENSITIVE_KEYWORDS
        .iter()
        .any(|k| lowered.contains(k))
        .then(|| format!("{query} {year}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    fn enhancer() -> (TempDir, QueryEnhancer) {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let cache = Arc::new(Cache::new(&cfg.cache, None));
        (tmp, QueryEnhancer::new(cfg.enhance.clone(), cache).unwrap())
    }

    #[tokio::test]
    async fn original_query_comes_first_and_list_is_capped() {
        let (_tmp, e) = enhancer();
        let variants = e.enhance("software market trends").await;
        assert_eq!(variants[0], "software market trends");
        assert!(variants.len() <= 5);
        let mut unique = variants.clone();
        unique.dedup();
        assert_eq!(unique.len(), variants.len());
        assert!(variants.contains(&"what is software market trends".to_string()));
        assert!(variants.contains(&"software market trends programming guide".to_string()));
    }

    #[tokio::test]
    async fn repeated_enhancement_hits_cache() {
        let (_tmp, e) = enhancer();
        let first = e.enhance("climate policy").await;
        let second = e.enhance("climate policy").await;
        assert_eq!(first, second);
        assert_eq!(e.cache.stats().memory_hits, 1);
    }

    #[test]
    fn question_skips_question_rewrites() {
        let v = semantic_variants("why is the sky blue?");
        assert_eq!(v, vec!["why is the sky", "why is the sky blue? guide"]);
    }

    #[test]
    fn single_word_keeps_two_rewrites() {
        assert_eq!(semantic_variants("rust"), vec!["what is rust", "how to rust"]);
    }

    #[test]
    fn domain_picks_first_matching_family() {
        assert_eq!(domain_variant("api design").as_deref(), Some("api design programming guide"));
        assert_eq!(domain_variant("diabetes treatment").as_deref(), Some("diabetes treatment medical information"));
        assert_eq!(domain_variant("cats"), None);
    }

    #[test]
    fn temporal_adds_year_only_when_absent() {
        assert_eq!(temporal_variant("ai news", 2026).as_deref(), Some("ai news 2026"));
        assert_eq!(temporal_variant("latest ai news", 2026), None);
        assert_eq!(temporal_variant("ai news 2025", 2026), None);
        assert_eq!(temporal_variant("sourdough", 2026), None);
    }

    #[test]
    fn suggestions_exclude_query_and_cap_at_three() {
        let body = serde_json::json!(["rust", ["Rust", "rust book", "rust lang", "rustup", "x"]]);
        assert_eq!(parse_suggestions(&body, "rust"), vec!["rust book", "rust lang"]);
        assert!(parse_suggestions(&serde_json::json!({}), "rust").is_empty());
    }

    #[tokio::test]
    async fn health_is_ok_offline() {
        let (_tmp, e) = enhancer();
        assert_eq!(e.health().await.status, crate::health::HealthStatus::Healthy);
    }
}
