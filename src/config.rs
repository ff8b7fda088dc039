//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit path), then applies `SIFT_WORK_DIR` and `SIFT_LOG_LEVEL`
//! env overrides. Provider API keys are read from the environment only and
//! never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Resolved configuration ────────────────────────────────────────────────────

/// Keys for the billed third-party services, sourced from env vars.
#[derive(Clone, Default)]
pub struct ApiKeys {
    pub brave: Option<String>,
    pub serpapi: Option<String>,
    pub proxy: Option<String>,
}

impl std::fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeys")
            .field("brave", &self.brave.is_some())
            .field("serpapi", &self.serpapi.is_some())
            .field("proxy", &self.proxy.is_some())
            .finish()
    }
}

/// Search provider endpoints and limits (`[search]`).
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub brave_url: String,
    pub serpapi_url: String,
    /// Per-call HTTP timeout for a single provider request.
    pub provider_timeout: Duration,
}

/// Query enhancement (`[enhance]`).
#[derive(Debug, Clone)]
pub struct EnhanceConfig {
    /// Public query-suggestion endpoint; `None` disables autocomplete.
    pub suggest_url: Option<String>,
    pub suggest_timeout: Duration,
    pub max_variants: usize,
}

/// Page fetching and extraction (`[extract]`).
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub proxy_url: String,
    /// Whole per-URL budget, across every page source.
    pub fetch_timeout: Duration,
    /// Cap on one source's attempt when another source is still queued, so
    /// a stalled proxy leaves time for the direct fetch.
    pub source_timeout: Duration,
    /// Characters kept per page after cleaning.
    pub max_content_length: usize,
}

/// Ollama-style inference endpoint (`[llm.ollama]`).
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub probe_timeout: Duration,
}

/// Retry policy for inference calls (`[llm.retry]`).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

/// LLM analysis configuration (`[llm]`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active provider: `"ollama"` or `"dummy"`.
    pub provider: String,
    pub ollama: OllamaConfig,
    pub retry: RetryConfig,
    /// How long a probe result is trusted.
    pub availability_ttl: Duration,
    /// After a failed call, availability is re-probed once this elapses.
    pub failure_cooldown: Duration,
    pub max_sources: usize,
    pub max_chars_per_source: usize,
    /// Answers shorter than this after cleaning count as failed attempts.
    pub min_answer_chars: usize,
    /// Directory holding prompt templates.
    pub prompts_dir: PathBuf,
}

/// Per-namespace cache TTLs (`[cache.ttl]`).
#[derive(Debug, Clone)]
pub struct CacheTtls {
    pub response: Duration,
    pub search: Duration,
    pub enhancement: Duration,
    pub content: Duration,
    pub cost: Duration,
    pub general: Duration,
}

/// Two-tier cache (`[cache]`).
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub memory_capacity: usize,
    /// SQLite file backing the shared tier; `None` runs memory-only.
    pub backing_path: Option<PathBuf>,
    pub ttl: CacheTtls,
    pub health_timeout: Duration,
}

/// Fixed per-unit prices in USD (`[budget.rates]`).
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    pub brave_search: f64,
    pub serpapi_search: f64,
    pub content_proxy: f64,
    pub inference_token: f64,
}

/// Daily spend cap (`[budget]`).
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub daily_usd: f64,
    /// Fraction of the budget at which a warning is logged.
    pub alert_ratio: f64,
    pub rates: RateTable,
}

/// Per-stage deadlines (`[timeouts]`).
#[derive(Debug, Clone)]
pub struct StageTimeouts {
    pub enhance: Duration,
    pub search: Duration,
    pub extract: Duration,
    pub analysis: Duration,
}

/// Composite health check (`[health]`).
#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub cache_for: Duration,
    pub probe_timeout: Duration,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    /// SQLite file for the request/cost ledger.
    pub store_path: PathBuf,
    pub keys: ApiKeys,
    pub search: SearchConfig,
    pub enhance: EnhanceConfig,
    pub extract: ExtractConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub budget: BudgetConfig,
    pub timeouts: StageTimeouts,
    pub health: HealthConfig,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    service: RawService,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    search: RawSearch,
    #[serde(default)]
    enhance: RawEnhance,
    #[serde(default)]
    extract: RawExtract,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    budget: RawBudget,
    #[serde(default)]
    timeouts: RawTimeouts,
    #[serde(default)]
    health: RawHealth,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default = "default_service_name")]
    name: String,
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize, Default)]
struct RawStore {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct RawSearch {
    #[serde(default = "default_brave_url")]
    brave_url: String,
    #[serde(default = "default_serpapi_url")]
    serpapi_url: String,
    #[serde(default = "default_provider_timeout_seconds")]
    provider_timeout_seconds: f64,
}

impl Default for RawSearch {
    fn default() -> Self {
        Self {
            brave_url: default_brave_url(),
            serpapi_url: default_serpapi_url(),
            provider_timeout_seconds: default_provider_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawEnhance {
    /// Empty string disables autocomplete.
    #[serde(default = "default_suggest_url")]
    suggest_url: String,
    #[serde(default = "default_suggest_timeout_seconds")]
    suggest_timeout_seconds: f64,
    #[serde(default = "default_max_variants")]
    max_variants: usize,
}

impl Default for RawEnhance {
    fn default() -> Self {
        Self {
            suggest_url: default_suggest_url(),
            suggest_timeout_seconds: default_suggest_timeout_seconds(),
            max_variants: default_max_variants(),
        }
    }
}

#[derive(Deserialize)]
struct RawExtract {
    #[serde(default = "default_proxy_url")]
    proxy_url: String,
    #[serde(default = "default_fetch_timeout_seconds")]
    fetch_timeout_seconds: f64,
    #[serde(default = "default_source_timeout_seconds")]
    source_timeout_seconds: f64,
    #[serde(default = "default_max_content_length")]
    max_content_length: usize,
}

impl Default for RawExtract {
    fn default() -> Self {
        Self {
            proxy_url: default_proxy_url(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
            source_timeout_seconds: default_source_timeout_seconds(),
            max_content_length: default_max_content_length(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    ollama: RawOllama,
    #[serde(default)]
    retry: RawRetry,
    #[serde(default = "default_availability_ttl_seconds")]
    availability_ttl_seconds: f64,
    #[serde(default = "default_failure_cooldown_seconds")]
    failure_cooldown_seconds: f64,
    #[serde(default = "default_max_sources")]
    max_sources: usize,
    #[serde(default = "default_max_chars_per_source")]
    max_chars_per_source: usize,
    #[serde(default = "default_min_answer_chars")]
    min_answer_chars: usize,
    #[serde(default = "default_prompts_dir")]
    prompts_dir: String,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            ollama: RawOllama::default(),
            retry: RawRetry::default(),
            availability_ttl_seconds: default_availability_ttl_seconds(),
            failure_cooldown_seconds: default_failure_cooldown_seconds(),
            max_sources: default_max_sources(),
            max_chars_per_source: default_max_chars_per_source(),
            min_answer_chars: default_min_answer_chars(),
            prompts_dir: default_prompts_dir(),
        }
    }
}

#[derive(Deserialize)]
struct RawOllama {
    #[serde(default = "default_ollama_host")]
    host: String,
    #[serde(default = "default_ollama_model")]
    model: String,
    #[serde(default = "default_ollama_temperature")]
    temperature: f32,
    #[serde(default = "default_ollama_max_tokens")]
    max_tokens: u32,
    #[serde(default = "default_ollama_timeout_seconds")]
    timeout_seconds: f64,
    #[serde(default = "default_probe_timeout_seconds")]
    probe_timeout_seconds: f64,
}

impl Default for RawOllama {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
            temperature: default_ollama_temperature(),
            max_tokens: default_ollama_max_tokens(),
            timeout_seconds: default_ollama_timeout_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawRetry {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    max_backoff_ms: u64,
}

impl Default for RawRetry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawCache {
    #[serde(default = "default_memory_capacity")]
    memory_capacity: usize,
    /// `"sqlite"` (default) or `"none"`.
    #[serde(default = "default_cache_backing")]
    backing: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    ttl: RawCacheTtl,
    #[serde(default = "default_cache_health_timeout_ms")]
    health_timeout_ms: u64,
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            backing: default_cache_backing(),
            path: None,
            ttl: RawCacheTtl::default(),
            health_timeout_ms: default_cache_health_timeout_ms(),
        }
    }
}

#[derive(Deserialize)]
struct RawCacheTtl {
    #[serde(default = "default_ttl_response")]
    response: u64,
    #[serde(default = "default_ttl_search")]
    search: u64,
    #[serde(default = "default_ttl_enhancement")]
    enhancement: u64,
    #[serde(default = "default_ttl_content")]
    content: u64,
    #[serde(default = "default_ttl_cost")]
    cost: u64,
    #[serde(default = "default_ttl_general")]
    general: u64,
}

impl Default for RawCacheTtl {
    fn default() -> Self {
        Self {
            response: default_ttl_response(),
            search: default_ttl_search(),
            enhancement: default_ttl_enhancement(),
            content: default_ttl_content(),
            cost: default_ttl_cost(),
            general: default_ttl_general(),
        }
    }
}

#[derive(Deserialize)]
struct RawBudget {
    #[serde(default = "default_daily_usd")]
    daily_usd: f64,
    #[serde(default = "default_alert_ratio")]
    alert_ratio: f64,
    #[serde(default)]
    rates: RawRates,
}

impl Default for RawBudget {
    fn default() -> Self {
        Self {
            daily_usd: default_daily_usd(),
            alert_ratio: default_alert_ratio(),
            rates: RawRates::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawRates {
    #[serde(default = "default_rate_brave")]
    brave_search: f64,
    #[serde(default = "default_rate_serpapi")]
    serpapi_search: f64,
    #[serde(default = "default_rate_proxy")]
    content_proxy: f64,
    #[serde(default)]
    inference_token: f64,
}

impl Default for RawRates {
    fn default() -> Self {
        Self {
            brave_search: default_rate_brave(),
            serpapi_search: default_rate_serpapi(),
            content_proxy: default_rate_proxy(),
            inference_token: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct RawTimeouts {
    #[serde(default = "default_enhance_seconds")]
    enhance_seconds: f64,
    #[serde(default = "default_search_seconds")]
    search_seconds: f64,
    #[serde(default = "default_extract_seconds")]
    extract_seconds: f64,
    #[serde(default = "default_analysis_seconds")]
    analysis_seconds: f64,
}

impl Default for RawTimeouts {
    fn default() -> Self {
        Self {
            enhance_seconds: default_enhance_seconds(),
            search_seconds: default_search_seconds(),
            extract_seconds: default_extract_seconds(),
            analysis_seconds: default_analysis_seconds(),
        }
    }
}

#[derive(Deserialize)]
struct RawHealth {
    #[serde(default = "default_health_cache_seconds")]
    cache_seconds: f64,
    #[serde(default = "default_probe_timeout_seconds")]
    probe_timeout_seconds: f64,
}

impl Default for RawHealth {
    fn default() -> Self {
        Self {
            cache_seconds: default_health_cache_seconds(),
            probe_timeout_seconds: default_probe_timeout_seconds(),
        }
    }
}

fn default_service_name() -> String { "sift".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_brave_url() -> String { "https://api.search.brave.com/res/v1/web/search".to_string() }
fn default_serpapi_url() -> String { "https://serpapi.com/search".to_string() }
fn default_provider_timeout_seconds() -> f64 { 10.0 }
fn default_suggest_url() -> String { "http://suggestqueries.google.com/complete/search".to_string() }
fn default_suggest_timeout_seconds() -> f64 { 3.0 }
fn default_max_variants() -> usize { 5 }
fn default_proxy_url() -> String { "https://api.zenrows.com/v1/".to_string() }
fn default_fetch_timeout_seconds() -> f64 { 15.0 }
fn default_source_timeout_seconds() -> f64 { 8.0 }
fn default_max_content_length() -> usize { 5000 }
fn default_llm_provider() -> String { "ollama".to_string() }
fn default_ollama_host() -> String { "http://localhost:11434".to_string() }
fn default_ollama_model() -> String { "llama2:7b".to_string() }
fn default_ollama_temperature() -> f32 { 0.1 }
fn default_ollama_max_tokens() -> u32 { 500 }
fn default_ollama_timeout_seconds() -> f64 { 20.0 }
fn default_probe_timeout_seconds() -> f64 { 3.0 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 4_000 }
fn default_availability_ttl_seconds() -> f64 { 60.0 }
fn default_failure_cooldown_seconds() -> f64 { 15.0 }
fn default_max_sources() -> usize { 5 }
fn default_max_chars_per_source() -> usize { 800 }
fn default_min_answer_chars() -> usize { 50 }
fn default_prompts_dir() -> String { "config/prompts".to_string() }
fn default_memory_capacity() -> usize { 1000 }
fn default_cache_backing() -> String { "sqlite".to_string() }
fn default_cache_health_timeout_ms() -> u64 { 2_000 }
fn default_ttl_response() -> u64 { 14_400 }
fn default_ttl_search() -> u64 { 1_800 }
fn default_ttl_enhancement() -> u64 { 3_600 }
fn default_ttl_content() -> u64 { 7_200 }
fn default_ttl_cost() -> u64 { 86_400 }
fn default_ttl_general() -> u64 { 3_600 }
fn default_daily_usd() -> f64 { 100.0 }
fn default_alert_ratio() -> f64 { 0.8 }
fn default_rate_brave() -> f64 { 0.005 }
fn default_rate_serpapi() -> f64 { 0.02 }
fn default_rate_proxy() -> f64 { 0.01 }
fn default_enhance_seconds() -> f64 { 5.0 }
fn default_search_seconds() -> f64 { 15.0 }
fn default_extract_seconds() -> f64 { 20.0 }
fn default_analysis_seconds() -> f64 { 30.0 }
fn default_health_cache_seconds() -> f64 { 30.0 }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (or `config/default.toml`), then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("SIFT_WORK_DIR").ok();
    let log_level_override = env::var("SIFT_LOG_LEVEL").ok();
    let keys = ApiKeys {
        brave: non_empty_env("BRAVE_SEARCH_API_KEY"),
        serpapi: non_empty_env("SERPAPI_API_KEY"),
        proxy: non_empty_env("ZENROWS_API_KEY"),
    };
    load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
        keys,
    )
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Internal loader: accepts an explicit path, overrides and keys.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
    keys: ApiKeys,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;
    resolve(parsed, work_dir_override, log_level_override, keys)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
    keys: ApiKeys,
) -> Result<Config, AppError> {
    let s = parsed.service;
    let work_dir = expand_home(work_dir_override.unwrap_or(&s.work_dir));
    let log_level = log_level_override.unwrap_or(&s.log_level).to_string();
    crate::logger::parse_level(&log_level)?;

    let store_path = resolve_path(&work_dir, parsed.store.path.as_deref(), "sift.db");

    let backing_path = match parsed.cache.backing.as_str() {
        "sqlite" => Some(resolve_path(&work_dir, parsed.cache.path.as_deref(), "cache.db")),
        "none" => None,
        other => {
            return Err(AppError::Config(format!(
                "unknown cache backing '{other}' (expected \"sqlite\" or \"none\")"
            )));
        }
    };

    let budget = parsed.budget;
    if !(budget.daily_usd.is_finite() && budget.daily_usd >= 0.0) {
        return Err(AppError::Config(format!(
            "budget.daily_usd must be a non-negative number, got {}",
            budget.daily_usd
        )));
    }
    if parsed.cache.memory_capacity == 0 {
        return Err(AppError::Config("cache.memory_capacity must be at least 1".into()));
    }

    let fetch_timeout = secs(parsed.extract.fetch_timeout_seconds)?;
    let source_timeout = secs(parsed.extract.source_timeout_seconds)?;
    if source_timeout.is_zero() || source_timeout >= fetch_timeout {
        return Err(AppError::Config(format!(
            "extract.source_timeout_seconds ({}) must be positive and below fetch_timeout_seconds ({})",
            source_timeout.as_secs_f64(),
            fetch_timeout.as_secs_f64(),
        )));
    }

    let suggest_url = Some(parsed.enhance.suggest_url.trim().to_string()).filter(|u| !u.is_empty());
    let llm = parsed.llm;
    let ttl = parsed.cache.ttl;

    Ok(Config {
        service_name: s.name,
        work_dir,
        log_level,
        store_path,
        keys,
        search: SearchConfig {
            brave_url: parsed.search.brave_url,
            serpapi_url: parsed.search.serpapi_url,
            provider_timeout: secs(parsed.search.provider_timeout_seconds)?,
        },
        enhance: EnhanceConfig {
            suggest_url,
            suggest_timeout: secs(parsed.enhance.suggest_timeout_seconds)?,
            max_variants: parsed.enhance.max_variants.max(1),
        },
        extract: ExtractConfig {
            proxy_url: parsed.extract.proxy_url,
            fetch_timeout,
            source_timeout,
            max_content_length: parsed.extract.max_content_length,
        },
        llm: LlmConfig {
            provider: llm.provider,
            ollama: OllamaConfig {
                host: llm.ollama.host.trim_end_matches('/').to_string(),
                model: llm.ollama.model,
                temperature: llm.ollama.temperature,
                max_tokens: llm.ollama.max_tokens,
                timeout: secs(llm.ollama.timeout_seconds)?,
                probe_timeout: secs(llm.ollama.probe_timeout_seconds)?,
            },
            retry: RetryConfig {
                max_attempts: llm.retry.max_attempts.max(1),
                initial_backoff: Duration::from_millis(llm.retry.initial_backoff_ms),
                max_backoff: Duration::from_millis(llm.retry.max_backoff_ms),
            },
            availability_ttl: secs(llm.availability_ttl_seconds)?,
            failure_cooldown: secs(llm.failure_cooldown_seconds)?,
            max_sources: llm.max_sources.max(1),
            max_chars_per_source: llm.max_chars_per_source,
            min_answer_chars: llm.min_answer_chars,
            prompts_dir: PathBuf::from(llm.prompts_dir),
        },
        cache: CacheConfig {
            memory_capacity: parsed.cache.memory_capacity,
            backing_path,
            ttl: CacheTtls {
                response: Duration::from_secs(ttl.response),
                search: Duration::from_secs(ttl.search),
                enhancement: Duration::from_secs(ttl.enhancement),
                content: Duration::from_secs(ttl.content),
                cost: Duration::from_secs(ttl.cost),
                general: Duration::from_secs(ttl.general),
            },
            health_timeout: Duration::from_millis(parsed.cache.health_timeout_ms),
        },
        budget: BudgetConfig {
            daily_usd: budget.daily_usd,
            alert_ratio: budget.alert_ratio.clamp(0.0, 1.0),
            rates: RateTable {
                brave_search: budget.rates.brave_search,
                serpapi_search: budget.rates.serpapi_search,
                content_proxy: budget.rates.content_proxy,
                inference_token: budget.rates.inference_token,
            },
        },
        timeouts: StageTimeouts {
            enhance: secs(parsed.timeouts.enhance_seconds)?,
            search: secs(parsed.timeouts.search_seconds)?,
            extract: secs(parsed.timeouts.extract_seconds)?,
            analysis: secs(parsed.timeouts.analysis_seconds)?,
        },
        health: HealthConfig {
            cache_for: secs(parsed.health.cache_seconds)?,
            probe_timeout: secs(parsed.health.probe_timeout_seconds)?,
        },
    })
}

fn secs(value: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| AppError::Config(format!("invalid duration {value}: {e}")))
}

/// Absolute paths are kept; relative ones are joined onto `work_dir`.
fn resolve_path(work_dir: &Path, configured: Option<&str>, default_name: &str) -> PathBuf {
    match configured {
        Some(p) => {
            let path = expand_home(p);
            if path.is_absolute() { path } else { work_dir.join(path) }
        }
        None => work_dir.join(default_name),
    }
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Safe `Config` for tests: dummy LLM, no API keys, no autocomplete,
    /// SQLite files under `work_dir`, short backoffs.
    pub fn test_default(work_dir: &Path) -> Result<Self, AppError> {
        let parsed: RawConfig = toml::from_str(
            r#"
[service]
name = "sift-test"
work_dir = "."

[enhance]
suggest_url = ""

[llm]
default = "dummy"

[llm.retry]
initial_backoff_ms = 1
max_backoff_ms = 4
"#,
        )
        .map_err(|e| AppError::Config(format!("test config: {e}")))?;
        let mut cfg = resolve(parsed, None, None, ApiKeys::default())?;
        cfg.work_dir = work_dir.to_path_buf();
        cfg.store_path = work_dir.join("sift.db");
        cfg.cache.backing_path = Some(work_dir.join("cache.db"));
        Ok(cfg)
    }
}
