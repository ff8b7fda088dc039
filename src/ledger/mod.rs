//! Cost/budget ledger.
//!
//! Per-request costs live in memory from [`CostLedger::start`] until
//! [`CostLedger::end`] or [`CostLedger::fail`], which persist the record and
//! fold it into the day's running aggregate. The aggregate is loaded from the
//! store on first use of a day and only ever updated additively afterwards.
//!
//! Components never see the ledger directly; they receive a [`Meter`] bound
//! to their request id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::cache::{Cache, Namespace};
use crate::config::{BudgetConfig, RateTable};
use crate::health::{Component, ComponentHealth};
use crate::store::journal::{Entry, Journal};
use crate::store::{DailyDelta, LedgerStore, UsageRecord};

// ── Providers ─────────────────────────────────────────────────────────────────

/// Every externally billed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    BraveSearch,
    SerpApi,
    ContentProxy,
    Inference,
}

impl Provider {
    pub const ALL: [Provider; 4] =
        [Provider::BraveSearch, Provider::SerpApi, Provider::ContentProxy, Provider::Inference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::BraveSearch => "brave_search",
            Provider::SerpApi => "serpapi",
            Provider::ContentProxy => "content_proxy",
            Provider::Inference => "inference",
        }
    }

    /// USD per unit (search call, proxied fetch, inference token).
    pub fn rate(&self, rates: &RateTable) -> f64 {
        match self {
            Provider::BraveSearch => rates.brave_search,
            Provider::SerpApi => rates.serpapi_search,
            Provider::ContentProxy => rates.content_proxy,
            Provider::Inference => rates.inference_token,
        }
    }
}

/// Unit counters, one per provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUnits {
    pub brave_search: u64,
    pub serpapi: u64,
    pub content_proxy: u64,
    pub inference_tokens: u64,
}

impl ProviderUnits {
    pub fn get(&self, provider: Provider) -> u64 {
        match provider {
            Provider::BraveSearch => self.brave_search,
            Provider::SerpApi => self.serpapi,
            Provider::ContentProxy => self.content_proxy,
            Provider::Inference => self.inference_tokens,
        }
    }

    pub fn add(&mut self, provider: Provider, units: u64) {
        let slot = match provider {
            Provider::BraveSearch => &mut self.brave_search,
            Provider::SerpApi => &mut self.serpapi,
            Provider::ContentProxy => &mut self.content_proxy,
            Provider::Inference => &mut self.inference_tokens,
        };
        *slot = slot.saturating_add(units);
    }

    pub fn merge(&mut self, other: &ProviderUnits) {
        for p in Provider::ALL {
            self.add(p, other.get(p));
        }
    }

    pub fn total(&self) -> u64 {
        Provider::ALL.iter().map(|p| self.get(*p)).sum()
    }

    pub fn cost(&self, rates: &RateTable) -> f64 {
        Provider::ALL.iter().map(|p| self.get(*p) as f64 * p.rate(rates)).sum()
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostStatus {
    Active,
    Completed,
    Error,
}

impl CostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CostStatus::Active => "active",
            CostStatus::Completed => "completed",
            CostStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(CostStatus::Active),
            "completed" => Some(CostStatus::Completed),
            "error" => Some(CostStatus::Error),
            _ => None,
        }
    }
}

/// Accrued cost of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestCost {
    pub request_id: String,
    pub user_id: Option<String>,
    pub units: ProviderUnits,
    pub total_cost: f64,
    pub status: CostStatus,
    pub started_at: DateTime<Utc>,
}

impl RequestCost {
    pub fn new(request_id: &str, user_id: Option<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            user_id,
            units: ProviderUnits::default(),
            total_cost: 0.0,
            status: CostStatus::Active,
            started_at: Utc::now(),
        }
    }
}

/// One day's running totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub requests: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub total_cost: f64,
    pub units: ProviderUnits,
}

impl DailyAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            requests: 0,
            cache_hits: 0,
            errors: 0,
            total_cost: 0.0,
            units: ProviderUnits::default(),
        }
    }

    pub fn cache_hit_rate(&self) -> f64 {
        if self.requests == 0 { 0.0 } else { self.cache_hits as f64 / self.requests as f64 }
    }

    fn apply(&mut self, delta: &DailyDelta) {
        self.requests += delta.requests;
        self.cache_hits += delta.cache_hits;
        self.errors += delta.errors;
        self.total_cost += delta.cost;
        self.units.merge(&delta.units);
    }
}

/// Spend attributed to one provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCost {
    pub provider: Provider,
    pub units: u64,
    pub cost: f64,
}

// ── CostLedger ────────────────────────────────────────────────────────────────

pub struct CostLedger {
    budget: BudgetConfig,
    store: Arc<dyn LedgerStore>,
    journal: Journal,
    cache: Option<Arc<Cache>>,
    active: Mutex<HashMap<String, RequestCost>>,
    daily: Mutex<Option<DailyAggregate>>,
}

impl CostLedger {
    pub fn new(
        budget: BudgetConfig,
        store: Arc<dyn LedgerStore>,
        journal: Journal,
        cache: Option<Arc<Cache>>,
    ) -> Self {
        Self {
            budget,
            store,
            journal,
            cache,
            active: Mutex::new(HashMap::new()),
            daily: Mutex::new(None),
        }
    }

    pub fn rates(&self) -> &RateTable {
        &self.budget.rates
    }

    pub fn daily_budget(&self) -> f64 {
        self.budget.daily_usd
    }

    /// Open an in-memory record for `request_id`.
    pub fn start(&self, request_id: &str, user_id: Option<&str>) {
        let record = RequestCost::new(request_id, user_id.map(str::to_string));
        if self.lock_active().insert(request_id.to_string(), record).is_some() {
            warn!(request_id, "cost record restarted, previous units discarded");
        }
        debug!(request_id, "cost tracking started");
    }

    /// Add `units` of `provider` to the request and journal the call.
    pub fn track(&self, request_id: &str, provider: Provider, units: u64) {
        if units == 0 {
            return;
        }
        let cost = units as f64 * provider.rate(&self.budget.rates);
        {
            let mut active = self.lock_active();
            match active.get_mut(request_id) {
                Some(record) => {
                    record.units.add(provider, units);
                    record.total_cost += cost;
                }
                None => {
                    warn!(request_id, provider = provider.as_str(), "usage for unknown request");
                }
            }
        }
        self.journal.send(Entry::Usage(UsageRecord {
            request_id: request_id.to_string(),
            provider,
            units,
            cost,
            at: Utc::now(),
        }));
        debug!(request_id, provider = provider.as_str(), units, cost, "usage tracked");
    }

    /// Finalise a successful request.
    pub async fn end(&self, request_id: &str, cache_hit: bool) -> RequestCost {
        self.finalize(request_id, CostStatus::Completed, cache_hit).await
    }

    /// Finalise a failed request. Partial work is still billed.
    pub async fn fail(&self, request_id: &str, reason: &str) -> RequestCost {
        warn!(request_id, reason, "request failed, finalising partial cost");
        self.finalize(request_id, CostStatus::Error, false).await
    }

    async fn finalize(&self, request_id: &str, status: CostStatus, cache_hit: bool) -> RequestCost {
        let mut record = self.lock_active().remove(request_id).unwrap_or_else(|| {
            warn!(request_id, "finalising unknown request, recording zero cost");
            RequestCost::new(request_id, None)
        });
        record.status = status;

        let today = Utc::now().date_naive();
        self.ensure_day(today).await;
        let delta = DailyDelta {
            date: today,
            requests: 1,
            cache_hits: u64::from(cache_hit),
            errors: u64::from(status == CostStatus::Error),
            cost: record.total_cost,
            units: record.units,
        };
        let spent = {
            let mut daily = self.lock_daily();
            let agg = daily.get_or_insert_with(|| DailyAggregate::empty(today));
            if agg.date != today {
                *agg = DailyAggregate::empty(today);
            }
            agg.apply(&delta);
            agg.total_cost
        };

        self.journal.send(Entry::Cost(record.clone()));
        self.journal.send(Entry::Daily(delta));
        if let Some(cache) = &self.cache {
            cache.set_json(request_id, &record, None, Namespace::Cost).await;
        }

        let ceiling = self.budget.daily_usd;
        if spent >= ceiling {
            error!(spent, ceiling, "daily budget exhausted");
        } else if spent >= ceiling * self.budget.alert_ratio {
            warn!(spent, ceiling, "approaching daily budget");
        }
        debug!(
            request_id,
            status = status.as_str(),
            cost = record.total_cost,
            units = record.units.total(),
            "cost tracking finished"
        );
        record
    }

    /// `true` while today's spend is below the ceiling. Fails open.
    pub async fn is_budget_available(&self) -> bool {
        self.daily_spend().await < self.budget.daily_usd
    }

    pub async fn daily_spend(&self) -> f64 {
        let today = Utc::now().date_naive();
        self.ensure_day(today).await;
        self.lock_daily()
            .as_ref()
            .filter(|agg| agg.date == today)
            .map_or(0.0, |agg| agg.total_cost)
    }

    /// Aggregate for `date`; today's comes from memory, older days from the store.
    pub async fn daily_stats(&self, date: NaiveDate) -> Option<DailyAggregate> {
        let today = Utc::now().date_naive();
        if date == today {
            self.ensure_day(today).await;
            return self.lock_daily().clone().filter(|agg| agg.date == today);
        }
        self.load_day(date).await
    }

    /// Today's spend per provider.
    pub async fn cost_breakdown(&self) -> Vec<ProviderCost> {
        let units = self
            .daily_stats(Utc::now().date_naive())
            .await
            .map(|agg| agg.units)
            .unwrap_or_default();
        Provider::ALL
            .iter()
            .map(|p| ProviderCost {
                provider: *p,
                units: units.get(*p),
                cost: units.get(*p) as f64 * p.rate(&self.budget.rates),
            })
            .collect()
    }

    /// In-flight record, else the cached final record, else the stored one.
    pub async fn request_cost(&self, request_id: &str) -> Option<RequestCost> {
        if let Some(active) = self.lock_active().get(request_id).cloned() {
            return Some(active);
        }
        if let Some(cache) = &self.cache {
            if let Some(record) = cache.get_json(request_id, Namespace::Cost).await {
                return Some(record);
            }
        }
        let store = Arc::clone(&self.store);
        let id = request_id.to_string();
        match tokio::task::spawn_blocking(move || store.load_request_cost(&id)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(request_id, error = %e, "cost record lookup failed");
                None
            }
            Err(e) => {
                warn!(request_id, error = %e, "cost record lookup task failed");
                None
            }
        }
    }

    pub fn active_requests(&self) -> usize {
        self.lock_active().len()
    }

    /// Budget headroom plus a store ping.
    pub async fn health(&self) -> ComponentHealth {
        let store = Arc::clone(&self.store);
        let ping = tokio::task::spawn_blocking(move || store.ping()).await;
        let spent = self.daily_spend().await;
        let details = serde_json::json!({
            "daily_spend": spent,
            "daily_budget": self.budget.daily_usd,
            "active_requests": self.active_requests(),
        });
        let health = match ping {
            Ok(Ok(())) if spent >= self.budget.daily_usd => {
                ComponentHealth::degraded(Component::Ledger, "daily budget exhausted")
            }
            Ok(Ok(())) => ComponentHealth::ok(Component::Ledger),
            Ok(Err(e)) => ComponentHealth::unhealthy(Component::Ledger, e.to_string()),
            Err(e) => ComponentHealth::unhealthy(Component::Ledger, format!("probe task failed: {e}")),
        };
        health.with_details(details)
    }

    /// Load `today` into memory unless it is already there. A failed load
    /// starts the day from zero so the budget gate fails open.
    async fn ensure_day(&self, today: NaiveDate) {
        if self.lock_daily().as_ref().is_some_and(|agg| agg.date == today) {
            return;
        }
        let loaded = self.load_day(today).await.unwrap_or_else(|| DailyAggregate::empty(today));
        let mut daily = self.lock_daily();
        // Another request may have loaded the day while this one waited.
        if !daily.as_ref().is_some_and(|agg| agg.date == today) {
            *daily = Some(loaded);
        }
    }

    async fn load_day(&self, date: NaiveDate) -> Option<DailyAggregate> {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || store.load_daily(date)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(%date, error = %e, "daily aggregate load failed");
                None
            }
            Err(e) => {
                warn!(%date, error = %e, "daily aggregate load task failed");
                None
            }
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, HashMap<String, RequestCost>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_daily(&self) -> MutexGuard<'_, Option<DailyAggregate>> {
        self.daily.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ── Meter ─────────────────────────────────────────────────────────────────────

/// Billing handle bound to one request. Cheap to clone.
#[derive(Clone)]
pub struct Meter {
    ledger: Option<Arc<CostLedger>>,
    request_id: Arc<str>,
}

impl Meter {
    pub fn new(ledger: Arc<CostLedger>, request_id: &str) -> Self {
        Self { ledger: Some(ledger), request_id: Arc::from(request_id) }
    }

    /// A meter that bills nothing (health probes, tests).
    pub fn noop() -> Self {
        Self { ledger: None, request_id: Arc::from("") }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn track(&self, provider: Provider, units: u64) {
        if let Some(ledger) = &self.ledger {
            ledger.track(&self.request_id, provider, units);
        }
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("request_id", &self.request_id)
            .field("enabled", &self.ledger.is_some())
            .finish()
    }
}
