//! Analysis engine.
//!
//! ```text
//! probe (memoised) ──unavailable──────────────────────────► fallback summary
//!        │
//!        └─available─► prompt ─► complete ─ok─► parse + score
//!                                   │
//!                                   └─retries exhausted──► fallback summary
//! ```
//!
//! A successful probe is trusted for `availability_ttl`; any failure marks the
//! server unavailable for `failure_cooldown`, after which it is re-probed.

pub mod prompt;
pub mod summary;

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{LlmConfig, RetryConfig};
use crate::extract::clean::truncate_chars;
use crate::health::{Component, ComponentHealth};
use crate::ledger::{Meter, Provider};
use crate::llm::LlmProvider;
use crate::timed::TimedValue;
use crate::types::{ContentRecord, Response};

const MAX_ANSWER_CHARS: usize = 2000;

/// Leading boilerplate models like to echo back.
const ANSWER_ARTIFACTS: &[&str] = &[
    "RESPONSE:",
    "Answer:",
    "Based on the search results:",
    "According to the provided information:",
];

const GENERIC_PHRASES: &[&str] =
    &["error", "unable to", "cannot provide", "insufficient information"];

pub struct AnalysisEngine {
    provider: LlmProvider,
    config: LlmConfig,
    availability: TimedValue<bool>,
}

impl AnalysisEngine {
    pub fn new(provider: LlmProvider, config: LlmConfig) -> Self {
        let availability = TimedValue::new(config.availability_ttl);
        Self { provider, config, availability }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Answer `query` from `contents`. Never fails: every failure path ends
    /// in the deterministic summary.
    pub async fn analyze(&self, query: &str, contents: &[ContentRecord], meter: &Meter) -> Response {
        if contents.is_empty() {
            debug!(request_id = %meter.request_id(), "no content; skipping inference");
            return fallback_response(query, contents);
        }
        if !self.is_available().await {
            info!(request_id = %meter.request_id(), provider = self.provider.name(), "inference unavailable; using fallback summary");
            return fallback_response(query, contents);
        }

        let sources =
            prompt::render_sources(contents, self.config.max_sources, self.config.max_chars_per_source);
        let prompt = prompt::analysis_prompt(&self.config.prompts_dir, query, &sources);

        match self.complete_with_retry(&prompt, meter).await {
            Some(answer) => {
                let confidence = answer_confidence(&answer, contents);
                Response::new(query, answer, contents.iter().map(|c| c.url.clone()).collect(), confidence)
            }
            None => {
                self.mark_unavailable();
                warn!(request_id = %meter.request_id(), "inference retries exhausted; using fallback summary");
                fallback_response(query, contents)
            }
        }
    }

    /// Memoised probe. A failed probe is cached for the cooldown only.
    pub async fn is_available(&self) -> bool {
        if let Some(available) = self.availability.get() {
            return available;
        }
        match self.provider.probe().await {
            Ok(()) => {
                self.availability.set(true);
                true
            }
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "inference probe failed");
                self.mark_unavailable();
                false
            }
        }
    }

    fn mark_unavailable(&self) {
        self.availability.set_with_ttl(false, self.config.failure_cooldown);
    }

    async fn complete_with_retry(&self, prompt: &str, meter: &Meter) -> Option<String> {
        let RetryConfig { max_attempts, initial_backoff, max_backoff } = self.config.retry;
        let mut backoff = initial_backoff;

        for attempt in 1..=max_attempts.max(1) {
            match self.provider.complete(prompt).await {
                Ok(response) => {
                    meter.track(Provider::Inference, response.tokens);
                    let answer = parse_answer(&response.text);
                    if answer.chars().count() >= self.config.min_answer_chars {
                        debug!(attempt, chars = answer.len(), tokens = response.tokens, "inference succeeded");
                        return Some(answer);
                    }
                    warn!(attempt, chars = answer.len(), "inference answer too short");
                }
                Err(e) => warn!(attempt, max_attempts, error = %e, "inference attempt failed"),
            }
            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff, max_backoff);
            }
        }
        None
    }

    /// Probe only; never runs inference.
    pub async fn health(&self) -> ComponentHealth {
        match self.provider.probe().await {
            Ok(()) => {
                self.availability.set(true);
                ComponentHealth::ok(Component::Analysis)
                    .with_details(serde_json::json!({ "provider": self.provider.name() }))
            }
            Err(e) => {
                self.mark_unavailable();
                ComponentHealth::degraded(
                    Component::Analysis,
                    format!("inference unavailable, fallback summaries only: {e}"),
                )
            }
        }
    }
}

fn next_backoff(current: Duration, cap: Duration) -> Duration {
    current.saturating_mul(2).min(cap)
}

fn fallback_response(query: &str, contents: &[ContentRecord]) -> Response {
    let s = summary::fallback_summary(query, contents);
    Response::new(query, s.answer, s.sources, s.confidence)
}

/// Strip echoed prompt labels and cap the length.
pub fn parse_answer(raw: &str) -> String {
    let mut answer = raw.trim();
    for artifact in ANSWER_ARTIFACTS {
        if let Some(rest) = answer.strip_prefix(artifact) {
            answer = rest.trim_start();
        }
    }
    truncate_chars(answer.trim(), MAX_ANSWER_CHARS)
}

/// Score from source quality, answer length and source diversity; the
/// model's own certainty plays no part.
pub fn answer_confidence(answer: &str, contents: &[ContentRecord]) -> f64 {
    let mut score = 0.5;
    if !contents.is_empty() {
        let avg = contents.iter().map(|c| c.confidence).sum::<f64>() / contents.len() as f64;
        score += avg * 0.3;
    }

    let words = answer.split_whitespace().count();
    if (50..=300).contains(&words) {
        score += 0.2;
    } else if words > 20 {
        score += 0.1;
    }

    let domains: HashSet<&str> = contents.iter().filter_map(|c| c.url.split('/').nth(2)).collect();
    if domains.len() > 1 {
        score += 0.1;
    }

    let lower = answer.to_lowercase();
    if GENERIC_PHRASES.iter().any(|p| lower.contains(p)) {
        score -= 0.2;
    }
    f64::clamp(score, 0.0, 1.0)
}
