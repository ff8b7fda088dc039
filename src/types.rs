//! Request-scoped data model shared by every stage.
//!
//! None of these types outlive a request except [`Response`], which may be
//! cached under the normalised query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_RESULTS_LIMIT: usize = 20;
pub const DEFAULT_MAX_RESULTS: usize = 8;

// ── RequestContext ────────────────────────────────────────────────────────────

/// Immutable per-request envelope built once at pipeline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub query: String,
    pub user_id: Option<String>,
    pub max_results: usize,
}

impl RequestContext {
    /// Validate and build a context with a fresh request id.
    ///
    /// The query is trimmed; it must then be 1–500 characters. `max_results`
    /// must be within 1–20.
    pub fn new(
        query: &str,
        user_id: Option<String>,
        max_results: usize,
    ) -> Result<Self, PipelineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(PipelineError::InvalidRequest("query must not be empty".into()));
        }
        let chars = query.chars().count();
        if chars > MAX_QUERY_CHARS {
            return Err(PipelineError::InvalidRequest(format!(
                "query is {chars} characters; limit is {MAX_QUERY_CHARS}"
            )));
        }
        if !(1..=MAX_RESULTS_LIMIT).contains(&max_results) {
            return Err(PipelineError::InvalidRequest(format!(
                "max_results must be between 1 and {MAX_RESULTS_LIMIT}, got {max_results}"
            )));
        }
        Ok(Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            query: query.to_string(),
            user_id: user_id.filter(|u| !u.trim().is_empty()),
            max_results,
        })
    }
}

/// Canonical cache subject for a query: trimmed, lowercased, single-spaced.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ── SearchResult ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    /// Unique key for deduplication.
    pub url: String,
    pub snippet: String,
    pub source_engine: String,
    /// Heuristic relevance in `[0, 1]`.
    pub relevance_score: f64,
}

// ── ContentRecord ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    News,
    Academic,
    Social,
    Ecommerce,
    General,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::News => "news",
            SourceCategory::Academic => "academic",
            SourceCategory::Social => "social",
            SourceCategory::Ecommerce => "ecommerce",
            SourceCategory::General => "general",
        }
    }
}

/// Which extractor produced a record's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Block-level article extraction (boilerplate removed).
    Article,
    /// Tag-stripping heuristic over the main container or body.
    TagStrip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub url: String,
    pub title: String,
    pub text: String,
    pub word_count: usize,
    pub source_category: SourceCategory,
    pub extraction_method: ExtractionMethod,
    /// Heuristic quality score in `[0, 1]`.
    pub confidence: f64,
    pub fetch_time_seconds: f64,
}

// ── Response ──────────────────────────────────────────────────────────────────

/// The externally visible answer. Serialised as JSON by the web layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub query: String,
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    pub processing_time_seconds: f64,
    pub cached: bool,
    #[serde(default)]
    pub cost_estimate: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Response {
    pub fn new(query: &str, answer: String, sources: Vec<String>, confidence: f64) -> Self {
        Self {
            query: query.to_string(),
            answer,
            sources,
            confidence: confidence.clamp(0.0, 1.0),
            processing_time_seconds: 0.0,
            cached: false,
            cost_estimate: None,
            timestamp: Utc::now(),
        }
    }
}
