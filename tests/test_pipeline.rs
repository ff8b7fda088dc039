//! End-to-end pipeline runs against fixed providers: no network, no keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sift::analysis::AnalysisEngine;
use sift::cache::Cache;
use sift::config::Config;
use sift::enhance::QueryEnhancer;
use sift::error::PipelineError;
use sift::extract::ContentExtractor;
use sift::extract::fetch::{FixedPages, PageSource};
use sift::health::{Component, HealthStatus};
use sift::ledger::{CostLedger, Provider};
use sift::llm::LlmProvider;
use sift::llm::providers::dummy::DummyProvider;
use sift::pipeline::{Pipeline, PipelineParts, StageStatus};
use sift::search::SearchAggregator;
use sift::search::providers::RawHit;
use sift::search::providers::fixed::FixedSearch;
use sift::search::providers::SearchProvider;
use sift::store::journal::Journal;
use sift::store::{LedgerStore, SqliteStore};

const QUERY: &str = "climate policy 2024";

const ANSWER: &str = "Governments widened carbon pricing during 2024 and several \
    regions tightened disclosure rules for large emitters, while the sources \
    disagree on how quickly the changes will cut emissions.";

struct Harness {
    pipeline: Pipeline,
    primary: FixedSearch,
    secondary: FixedSearch,
    pages: FixedPages,
    journal: Journal,
    shutdown: CancellationToken,
    journal_task: JoinHandle<()>,
    _tmp: TempDir,
}

impl Harness {
    async fn close(self) {
        self.journal.flush().await;
        self.shutdown.cancel();
        self.journal_task.await.unwrap();
    }
}

fn url(n: usize) -> String {
    format!("https://site{n}.example/climate-{n}")
}

fn hit(n: usize) -> RawHit {
    RawHit {
        title: format!("Climate policy report {n}"),
        url: url(n),
        snippet: format!("Snippet {n} about climate policy in 2024."),
        position: None,
    }
}

fn page(n: usize) -> String {
    format!(
        "<html><head><title>Report {n}</title></head><body>\
         <nav><a href='/'>Home</a></nav>\
         <article><p>Report {n} describes how climate policy changed across many regions during 2024.</p>\
         <p>Carbon prices rose and emissions reporting became mandatory for large companies.</p></article>\
         </body></html>"
    )
}

/// Providers and pages behind one pipeline.
struct Fixtures {
    llm: DummyProvider,
    primary: FixedSearch,
    secondary: FixedSearch,
    pages: FixedPages,
}

impl Fixtures {
    /// Five hits from the primary provider, three from the secondary with one
    /// overlap (seven distinct URLs); pages exist for the first six.
    fn new(llm: DummyProvider) -> Self {
        Self {
            llm,
            primary: FixedSearch::new("primary", (1..=5).map(hit).collect()).billed_as(Provider::BraveSearch),
            secondary: FixedSearch::new("secondary", [5, 6, 7].into_iter().map(hit).collect()),
            pages: FixedPages::new((1..=6).map(|n| (url(n), page(n)))),
        }
    }
}

fn harness(llm: DummyProvider, tune: impl FnOnce(&mut Config), slow_search: Option<Duration>) -> Harness {
    let mut fixtures = Fixtures::new(llm);
    if let Some(delay) = slow_search {
        fixtures.primary = fixtures.primary.with_delay(delay);
    }
    harness_with(fixtures, tune)
}

fn harness_with(fixtures: Fixtures, tune: impl FnOnce(&mut Config)) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = Config::test_default(tmp.path()).unwrap();
    cfg.llm.prompts_dir = "config/prompts".into();
    tune(&mut cfg);

    let Fixtures { llm, primary, secondary, pages } = fixtures;
    let store: Arc<dyn LedgerStore> = Arc::new(SqliteStore::open(&cfg.store_path).unwrap());
    let shutdown = CancellationToken::new();
    let (journal, journal_task) = Journal::spawn(Arc::clone(&store), shutdown.clone());
    let cache = Arc::new(Cache::open(&cfg.cache));
    let ledger = Arc::new(CostLedger::new(cfg.budget.clone(), store, journal.clone(), Some(Arc::clone(&cache))));

    let parts = PipelineParts {
        enhancer: QueryEnhancer::new(cfg.enhance.clone(), Arc::clone(&cache)).unwrap(),
        search: SearchAggregator::new(
            vec![SearchProvider::Fixed(primary.clone()), SearchProvider::Fixed(secondary.clone())],
            Arc::clone(&cache),
            cfg.search.provider_timeout,
        ),
        extractor: ContentExtractor::new(&cfg.extract, vec![PageSource::Fixed(pages.clone())], Arc::clone(&cache)),
        analysis: AnalysisEngine::new(LlmProvider::Dummy(llm), cfg.llm.clone()),
        cache,
        ledger,
        journal: journal.clone(),
    };
    let pipeline = Pipeline::from_parts(parts, cfg.timeouts.clone(), cfg.health.clone());

    Harness { pipeline, primary, secondary, pages, journal, shutdown, journal_task, _tmp: tmp }
}

/// Accepts connections and never answers.
async fn silent_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/complete/search")
}

#[tokio::test]
async fn unreachable_inference_summarises_extracted_pages() {
    let h = harness(DummyProvider::unreachable(), |_| {}, None);

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();
    let r = &traced.response;

    assert!(!traced.degraded(), "stages: {:?}", traced.stages);
    assert_eq!(r.query, QUERY);
    assert!(r.answer.starts_with("Summary of 6 sources"), "answer: {}", r.answer);
    assert_eq!(r.sources.len(), 6);
    assert!(!r.sources.contains(&url(7)));
    assert!((0.6..=0.7).contains(&r.confidence), "confidence {}", r.confidence);
    assert!(!r.cached);
    assert_eq!(h.pages.calls(), 7);

    h.close().await;
}

#[tokio::test]
async fn inference_answer_is_returned_with_sources() {
    let llm = DummyProvider::new().with_reply(ANSWER);
    let h = harness(llm.clone(), |_| {}, None);

    let r = h.pipeline.process(QUERY, Some("user-1"), 8).await.unwrap();

    assert_eq!(r.answer, ANSWER);
    assert_eq!(r.sources.len(), 6);
    assert_eq!(llm.calls(), 1);
    assert!(r.cost_estimate.unwrap_or_default() > 0.0);

    h.close().await;
}

#[tokio::test]
async fn repeat_query_is_served_from_cache_at_no_cost() {
    let h = harness(DummyProvider::unreachable(), |_| {}, None);

    let first = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();
    let primary_calls = h.primary.calls();
    let secondary_calls = h.secondary.calls();
    let first_cost = h.pipeline.ledger().request_cost(&first.request_id).await.unwrap();
    assert!(first_cost.units.get(Provider::BraveSearch) > 0);

    // Case and spacing differences normalise to the same cache key.
    let second = h.pipeline.process_traced("  Climate POLICY 2024 ", None, 8).await.unwrap();
    assert!(second.response.cached);
    assert_eq!(second.response.query, "Climate POLICY 2024");
    assert_eq!(second.response.answer, first.response.answer);
    assert_eq!(second.response.cost_estimate, Some(0.0));
    assert!(second.stages.is_empty());
    assert_eq!(h.primary.calls(), primary_calls);
    assert_eq!(h.secondary.calls(), secondary_calls);

    let second_cost = h.pipeline.ledger().request_cost(&second.request_id).await.unwrap();
    assert_eq!(second_cost.units.total(), 0);

    let today = h.pipeline.ledger().daily_stats(Utc::now().date_naive()).await.unwrap();
    assert_eq!(today.requests, 2);
    assert_eq!(today.cache_hits, 1);

    h.close().await;
}

#[tokio::test]
async fn exhausted_budget_rejects_before_any_provider_call() {
    let h = harness(DummyProvider::new(), |cfg| cfg.budget.daily_usd = 0.0, None);

    let err = h.pipeline.process(QUERY, None, 8).await.unwrap_err();

    assert!(matches!(err, PipelineError::BudgetExceeded { .. }), "got {err:?}");
    assert!(err.is_retryable());
    assert_eq!(h.primary.calls(), 0);
    assert_eq!(h.pages.calls(), 0);
    let today = h.pipeline.ledger().daily_stats(Utc::now().date_naive()).await.unwrap();
    assert_eq!(today.errors, 1);
    assert_eq!(today.units.total(), 0);

    h.close().await;
}

#[tokio::test]
async fn invalid_query_is_rejected() {
    let h = harness(DummyProvider::new(), |_| {}, None);

    let err = h.pipeline.process("   ", None, 8).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)), "got {err:?}");
    let err = h.pipeline.process(QUERY, None, 0).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRequest(_)), "got {err:?}");

    h.close().await;
}

#[tokio::test]
async fn slow_analysis_falls_back_to_summary() {
    let llm = DummyProvider::new().with_reply(ANSWER).with_delay(Duration::from_secs(5));
    let h = harness(llm, |cfg| cfg.timeouts.analysis = Duration::from_millis(100), None);

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    assert_eq!(traced.stage("analysis").map(|s| s.status), Some(StageStatus::TimedOut));
    assert!(traced.response.answer.starts_with("Summary of 6 sources"));
    assert_eq!(traced.response.sources.len(), 6);
    assert!((traced.response.confidence - 0.55).abs() < 1e-9);

    // Degraded answers are not cached.
    let again = h.pipeline.process(QUERY, None, 8).await.unwrap();
    assert!(!again.cached);

    h.close().await;
}

#[tokio::test]
async fn slow_search_still_answers() {
    let h = harness(
        DummyProvider::new(),
        |cfg| cfg.timeouts.search = Duration::from_millis(100),
        Some(Duration::from_secs(5)),
    );

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    assert_eq!(traced.stage("search").map(|s| s.status), Some(StageStatus::TimedOut));
    assert_eq!(traced.stage("extract").map(|s| s.status), Some(StageStatus::Completed));
    assert!(!traced.response.answer.is_empty());
    assert!(traced.response.sources.is_empty());
    assert_eq!(h.pages.calls(), 0);

    h.close().await;
}

#[tokio::test]
async fn health_reports_every_component() {
    let h = harness(DummyProvider::unreachable(), |_| {}, None);

    let report = h.pipeline.health().await;

    assert_eq!(report.components.len(), 6);
    assert_eq!(report.component(Component::Analysis).map(|c| c.status), Some(HealthStatus::Degraded));
    assert_eq!(report.component(Component::Cache).map(|c| c.status), Some(HealthStatus::Healthy));
    assert_eq!(report.component(Component::Search).map(|c| c.status), Some(HealthStatus::Healthy));
    // A degraded component does not count against the overall status.
    assert_eq!(report.overall, HealthStatus::Healthy);

    let again = h.pipeline.health().await;
    assert_eq!(again.checked_at, report.checked_at);

    h.close().await;
}

#[tokio::test]
async fn failing_providers_degrade_and_are_not_cached() {
    let mut fixtures = Fixtures::new(DummyProvider::new());
    fixtures.primary = fixtures.primary.failing();
    fixtures.secondary = fixtures.secondary.failing();
    let h = harness_with(fixtures, |_| {});

    let traced = h.pipeline.process_traced("climate policy", None, 8).await.unwrap();

    assert!(traced.degraded());
    assert_eq!(traced.stage("search").map(|s| s.status), Some(StageStatus::Empty));
    assert!(!traced.response.answer.is_empty());
    assert!(traced.response.sources.is_empty());
    assert_eq!(traced.response.confidence, 0.0);

    let again = h.pipeline.process("climate policy", None, 8).await.unwrap();
    assert!(!again.cached);

    h.close().await;
}

#[tokio::test]
async fn unfetchable_pages_degrade_extraction() {
    let mut fixtures = Fixtures::new(DummyProvider::new());
    fixtures.pages = FixedPages::new(Vec::<(String, String)>::new());
    let pages = fixtures.pages.clone();
    let h = harness_with(fixtures, |_| {});

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    assert_eq!(traced.stage("search").map(|s| s.status), Some(StageStatus::Completed));
    assert_eq!(traced.stage("extract").map(|s| s.status), Some(StageStatus::Empty));
    assert!(traced.response.sources.is_empty());
    assert_eq!(pages.calls(), 7);

    let again = h.pipeline.process(QUERY, None, 8).await.unwrap();
    assert!(!again.cached);

    h.close().await;
}

#[tokio::test]
async fn slow_enhancement_falls_back_to_original_query() {
    let suggest_url = silent_server().await;
    let h = harness(
        DummyProvider::unreachable(),
        |cfg| {
            cfg.enhance.suggest_url = Some(suggest_url);
            cfg.enhance.suggest_timeout = Duration::from_secs(30);
            cfg.timeouts.enhance = Duration::from_millis(100);
        },
        None,
    );

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    assert_eq!(traced.stage("enhance").map(|s| s.status), Some(StageStatus::TimedOut));
    // Only the original query reached the providers.
    assert_eq!(h.primary.calls(), 1);
    assert_eq!(h.secondary.calls(), 1);
    assert_eq!(traced.response.sources.len(), 6);

    h.close().await;
}

#[tokio::test]
async fn slow_extraction_still_answers() {
    let mut fixtures = Fixtures::new(DummyProvider::new());
    fixtures.pages = fixtures.pages.with_delay(Duration::from_secs(5));
    let h = harness_with(fixtures, |cfg| cfg.timeouts.extract = Duration::from_millis(100));

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    assert_eq!(traced.stage("extract").map(|s| s.status), Some(StageStatus::TimedOut));
    assert_eq!(traced.stage("analysis").map(|s| s.status), Some(StageStatus::Completed));
    assert!(!traced.response.answer.is_empty());
    assert!(traced.response.sources.is_empty());

    h.close().await;
}

#[tokio::test]
async fn panicking_provider_fails_its_stage_only() {
    let mut fixtures = Fixtures::new(DummyProvider::new());
    fixtures.primary = fixtures.primary.panicking();
    let h = harness_with(fixtures, |_| {});

    let traced = h.pipeline.process_traced(QUERY, None, 8).await.unwrap();

    let search = traced.stage("search").unwrap();
    assert_eq!(search.status, StageStatus::Failed);
    assert!(search.error.as_deref().is_some_and(|e| e.contains("panicked")));
    assert_eq!(traced.stage("analysis").map(|s| s.status), Some(StageStatus::Completed));
    assert!(!traced.response.answer.is_empty());

    h.close().await;
}
