//! Query pipeline orchestrator.
//!
//! ```text
//! budget gate ─► response cache ─hit──────────────────────────────► Response (cached)
//!                     │miss
//!                     ▼
//!   enhance ─► search ─► extract ─► analyse ─► cache store ─► Response
//! ```
//!
//! Every stage runs as its own task under a deadline. A stage that fails,
//! panics, overruns or comes back empty falls back to a neutral value and the
//! request carries on with lowered confidence; such answers are not cached. Only the budget gate and a runtime that is
//! shutting down end a request with an error.
//!
//! Built once at startup and shared by `Arc`; there is no global instance.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisEngine, summary};
use crate::cache::{Cache, Namespace};
use crate::config::{Config, HealthConfig, StageTimeouts};
use crate::enhance::QueryEnhancer;
use crate::error::{AppError, PipelineError, StageError};
use crate::extract::{ContentExtractor, fetch};
use crate::health::{Component, HealthReport, Probe, run_probes};
use crate::ledger::{CostLedger, CostStatus, Meter};
use crate::llm;
use crate::search::{SearchAggregator, providers};
use crate::store::journal::{Entry, Journal};
use crate::store::{LedgerStore, RequestOutcome, RequestStart};
use crate::timed::TimedValue;
use crate::types::{RequestContext, Response, normalize_query};

/// Confidence removed when any stage fell back.
const DEGRADED_PENALTY: f64 = 0.1;

// ── Stage trace ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Ran to completion but produced nothing usable, e.g. every provider failed.
    Empty,
    Failed,
    TimedOut,
}

/// How one stage resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    pub stage: &'static str,
    pub status: StageStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A response plus the per-stage outcomes that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct Traced {
    pub request_id: String,
    pub response: Response,
    pub stages: Vec<StageRecord>,
}

impl Traced {
    pub fn degraded(&self) -> bool {
        self.stages.iter().any(|s| s.status != StageStatus::Completed)
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Pre-built components, for callers that assemble providers themselves.
pub struct PipelineParts {
    pub enhancer: QueryEnhancer,
    pub search: SearchAggregator,
    pub extractor: ContentExtractor,
    pub analysis: AnalysisEngine,
    pub cache: Arc<Cache>,
    pub ledger: Arc<CostLedger>,
    pub journal: Journal,
}

pub struct Pipeline {
    enhancer: Arc<QueryEnhancer>,
    search: Arc<SearchAggregator>,
    extractor: Arc<ContentExtractor>,
    analysis: Arc<AnalysisEngine>,
    cache: Arc<Cache>,
    ledger: Arc<CostLedger>,
    journal: Journal,
    timeouts: StageTimeouts,
    health_config: HealthConfig,
    health_cache: TimedValue<HealthReport>,
}

impl Pipeline {
    pub fn from_parts(parts: PipelineParts, timeouts: StageTimeouts, health_config: HealthConfig) -> Self {
        Self {
            enhancer: Arc::new(parts.enhancer),
            search: Arc::new(parts.search),
            extractor: Arc::new(parts.extractor),
            analysis: Arc::new(parts.analysis),
            cache: parts.cache,
            ledger: parts.ledger,
            journal: parts.journal,
            health_cache: TimedValue::new(health_config.cache_for),
            timeouts,
            health_config,
        }
    }

    /// Build every component from configuration. Providers without API keys
    /// are left out; the cache runs memory-only if its SQLite tier fails.
    pub fn build(config: &Config, store: Arc<dyn LedgerStore>, journal: Journal) -> Result<Self, AppError> {
        let cache = Arc::new(Cache::open(&config.cache));

        let enhancer = QueryEnhancer::new(config.enhance.clone(), Arc::clone(&cache))
            .map_err(|e| AppError::Config(format!("query enhancer: {e}")))?;
        let search_providers = providers::build(&config.search, &config.keys)
            .map_err(|e| AppError::Config(format!("search providers: {e}")))?;
        let page_sources = fetch::build(&config.extract, &config.keys)
            .map_err(|e| AppError::Config(format!("page sources: {e}")))?;
        let llm = llm::providers::build(&config.llm)
            .map_err(|e| AppError::Config(format!("llm provider: {e}")))?;
        let ledger = Arc::new(CostLedger::new(
            config.budget.clone(),
            store,
            journal.clone(),
            Some(Arc::clone(&cache)),
        ));

        let parts = PipelineParts {
            enhancer,
            search: SearchAggregator::new(search_providers, Arc::clone(&cache), config.search.provider_timeout),
            extractor: ContentExtractor::new(&config.extract, page_sources, Arc::clone(&cache)),
            analysis: AnalysisEngine::new(llm, config.llm.clone()),
            cache,
            ledger,
            journal,
        };
        info!(
            search = ?parts.search.provider_names(),
            llm = parts.analysis.provider_name(),
            "pipeline ready"
        );
        Ok(Self::from_parts(parts, config.timeouts.clone(), config.health.clone()))
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    /// Answer `query`. Fails only on invalid input, an exhausted budget or
    /// runtime shutdown.
    pub async fn process(
        &self,
        query: &str,
        user_id: Option<&str>,
        max_results: usize,
    ) -> Result<Response, PipelineError> {
        self.process_traced(query, user_id, max_results).await.map(|t| t.response)
    }

    /// [`process`](Self::process), also reporting how each stage resolved.
    pub async fn process_traced(
        &self,
        query: &str,
        user_id: Option<&str>,
        max_results: usize,
    ) -> Result<Traced, PipelineError> {
        let started = Instant::now();
        let ctx = RequestContext::new(query, user_id.map(str::to_string), max_results)?;
        let id = ctx.request_id.clone();
        info!(request_id = %id, query = %ctx.query, max_results, "request started");

        self.journal.send(Entry::RequestStarted(RequestStart {
            request_id: id.clone(),
            query: ctx.query.clone(),
            user_id: ctx.user_id.clone(),
            at: Utc::now(),
        }));
        self.ledger.start(&id, ctx.user_id.as_deref());

        if !self.ledger.is_budget_available().await {
            let err = PipelineError::BudgetExceeded {
                spent: self.ledger.daily_spend().await,
                ceiling: self.ledger.daily_budget(),
            };
            self.finish_with_error(&id, started, &err).await;
            return Err(err);
        }

        let subject = normalize_query(&ctx.query);
        if let Some(mut response) = self.cache.get_json::<Response>(&subject, Namespace::Response).await {
            response.cached = true;
            response.query = ctx.query.clone();
            response.processing_time_seconds = started.elapsed().as_secs_f64();
            response.cost_estimate = Some(0.0);
            self.ledger.end(&id, true).await;
            self.record_outcome(&id, CostStatus::Completed, started, true, None);
            info!(request_id = %id, "served from response cache");
            return Ok(Traced { request_id: id, response, stages: Vec::new() });
        }

        match self.run_stages(&ctx).await {
            Ok((mut response, stages)) => {
                let degraded = stages.iter().any(|s| s.status != StageStatus::Completed);
                if degraded {
                    response.confidence = (response.confidence - DEGRADED_PENALTY).max(0.0);
                } else if response.sources.is_empty() {
                    debug!(request_id = %id, "answer has no sources, not caching");
                } else {
                    self.cache.set_json(&subject, &response, None, Namespace::Response).await;
                }

                let cost = self.ledger.end(&id, false).await;
                response.processing_time_seconds = started.elapsed().as_secs_f64();
                response.cost_estimate = Some(cost.total_cost);
                self.record_outcome(&id, CostStatus::Completed, started, false, None);
                info!(
                    request_id = %id,
                    sources = response.sources.len(),
                    confidence = response.confidence,
                    degraded,
                    cost = cost.total_cost,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "request completed"
                );
                Ok(Traced { request_id: id, response, stages })
            }
            Err(err) => {
                self.finish_with_error(&id, started, &err).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, ctx: &RequestContext) -> Result<(Response, Vec<StageRecord>), PipelineError> {
        let meter = Meter::new(Arc::clone(&self.ledger), &ctx.request_id);
        let mut stages = Vec::with_capacity(4);

        let enhancer = Arc::clone(&self.enhancer);
        let query = ctx.query.clone();
        let queries = run_stage(&mut stages, "enhance", self.timeouts.enhance, &ctx.request_id, async move {
            enhancer.enhance(&query).await
        })
        .await?
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| vec![ctx.query.clone()]);

        let search = Arc::clone(&self.search);
        let search_meter = meter.clone();
        let per_query = ctx.max_results;
        let results = run_stage(&mut stages, "search", self.timeouts.search, &ctx.request_id, async move {
            search.search(&queries, per_query, &search_meter).await
        })
        .await?
        .unwrap_or_default();
        if results.is_empty() {
            mark_empty(&mut stages, "search", "no search results");
        }

        let extractor = Arc::clone(&self.extractor);
        let extract_meter = meter.clone();
        let max_urls = ctx.max_results;
        let had_results = !results.is_empty();
        let contents = run_stage(&mut stages, "extract", self.timeouts.extract, &ctx.request_id, async move {
            extractor.fetch(&results, max_urls, &extract_meter).await
        })
        .await?
        .unwrap_or_default();
        if had_results && contents.is_empty() {
            mark_empty(&mut stages, "extract", "no page could be extracted");
        }

        let analysis = Arc::clone(&self.analysis);
        let analysis_contents = contents.clone();
        let query = ctx.query.clone();
        let answer = run_stage(&mut stages, "analysis", self.timeouts.analysis, &ctx.request_id, async move {
            analysis.analyze(&query, &analysis_contents, &meter).await
        })
        .await?;

        let response = answer.unwrap_or_else(|| {
            let s = summary::fallback_summary(&ctx.query, &contents);
            Response::new(&ctx.query, s.answer, s.sources, s.confidence)
        });
        if response.answer.trim().is_empty() && !contents.is_empty() {
            return Err(PipelineError::Failure("analysis produced an empty answer".into()));
        }
        Ok((response, stages))
    }

    async fn finish_with_error(&self, id: &str, started: Instant, err: &PipelineError) {
        self.ledger.fail(id, &err.to_string()).await;
        self.record_outcome(id, CostStatus::Error, started, false, Some(err.to_string()));
        warn!(request_id = %id, error = %err, "request failed");
    }

    fn record_outcome(&self, id: &str, status: CostStatus, started: Instant, cached: bool, error: Option<String>) {
        self.journal.send(Entry::RequestFinished(RequestOutcome {
            request_id: id.to_string(),
            status,
            processing_time_seconds: started.elapsed().as_secs_f64(),
            cached,
            error,
            at: Utc::now(),
        }));
    }

    /// Composite health, memoised for `[health] cache_seconds`.
    pub async fn health(&self) -> HealthReport {
        if let Some(report) = self.health_cache.get() {
            return report;
        }
        let probes: Vec<Probe<'_>> = vec![
            (Component::Enhancer, Box::pin(self.enhancer.health())),
            (Component::Search, Box::pin(self.search.health())),
            (Component::Extractor, Box::pin(self.extractor.health())),
            (Component::Analysis, Box::pin(self.analysis.health())),
            (Component::Cache, Box::pin(self.cache.health())),
            (Component::Ledger, Box::pin(self.ledger.health())),
        ];
        let report = run_probes(probes, self.health_config.probe_timeout).await;
        debug!(overall = ?report.overall, "health probes finished");
        self.health_cache.set(report.clone());
        report
    }
}

/// Downgrade a completed stage whose output was empty.
fn mark_empty(stages: &mut [StageRecord], stage: &'static str, reason: &str) {
    if let Some(record) = stages.iter_mut().find(|s| s.stage == stage && s.status == StageStatus::Completed) {
        warn!(stage, reason, "stage produced nothing, using fallback");
        record.status = StageStatus::Empty;
        record.error = Some(reason.to_string());
    }
}

/// Run one stage as its own task under `budget`.
///
/// `Ok(Some(v))` on success, `Ok(None)` when the stage failed or timed out
/// (recorded in `stages`), `Err` only when the runtime cancelled the task.
async fn run_stage<T, F>(
    stages: &mut Vec<StageRecord>,
    stage: &'static str,
    budget: Duration,
    request_id: &str,
    work: F,
) -> Result<Option<T>, PipelineError>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let mut handle = tokio::spawn(work);
    let outcome = match tokio::time::timeout(budget, &mut handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.is_panic() => Err(StageError::failure(stage, "stage panicked")),
        Ok(Err(e)) => {
            return Err(PipelineError::Failure(format!("stage '{stage}' cancelled: {e}")));
        }
        Err(_) => {
            handle.abort();
            Err(StageError::Timeout { stage, budget })
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(value) => {
            debug!(request_id, stage, elapsed_ms, "stage completed");
            stages.push(StageRecord { stage, status: StageStatus::Completed, elapsed_ms, error: None });
            Ok(Some(value))
        }
        Err(e) => {
            let status = if e.is_timeout() { StageStatus::TimedOut } else { StageStatus::Failed };
            warn!(request_id, stage, elapsed_ms, error = %e, "stage degraded, using fallback");
            stages.push(StageRecord { stage, status, elapsed_ms, error: Some(e.to_string()) });
            Ok(None)
        }
    }
}
