//! Composite health model.
//!
//! Every pipeline component exposes a cheap self-test returning a
//! [`ComponentHealth`]. [`run_probes`] runs them concurrently, bounds each
//! one by a timeout and folds the results into a [`HealthReport`]. Caching of
//! the report lives with the caller (see `Pipeline::health`).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── ComponentHealth ───────────────────────────────────────────────────────────

/// Closed set of components that report health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Enhancer,
    Search,
    Extractor,
    Analysis,
    Cache,
    Ledger,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Enhancer => "enhancer",
            Component::Search => "search",
            Component::Extractor => "extractor",
            Component::Analysis => "analysis",
            Component::Cache => "cache",
            Component::Ledger => "ledger",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Timeout,
}

impl HealthStatus {
    /// `true` for the statuses that count against `overall`.
    pub fn is_failing(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy | HealthStatus::Timeout)
    }
}

/// Health snapshot for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub component: Component,
    pub status: HealthStatus,
    pub message: String,
    /// Optional structured extras (counts, latency, configured providers).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn ok(component: Component) -> Self {
        Self::with_status(component, HealthStatus::Healthy, "ok")
    }

    pub fn degraded(component: Component, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Degraded, message)
    }

    pub fn unhealthy(component: Component, message: impl Into<String>) -> Self {
        Self::with_status(component, HealthStatus::Unhealthy, message)
    }

    pub fn timeout(component: Component, after: Duration) -> Self {
        Self::with_status(
            component,
            HealthStatus::Timeout,
            format!("probe exceeded {} ms", after.as_millis()),
        )
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn with_status(component: Component, status: HealthStatus, message: impl Into<String>) -> Self {
        Self { component, status, message: message.into(), details: None }
    }
}

// ── HealthReport ──────────────────────────────────────────────────────────────

/// Aggregated health payload for liveness/readiness probes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let statuses: Vec<HealthStatus> = components.iter().map(|c| c.status).collect();
        Self { overall: overall_status(&statuses), components, checked_at: Utc::now() }
    }

    pub fn component(&self, component: Component) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.component == component)
    }
}

/// Healthy when nothing is unhealthy or timed out, degraded when exactly one
/// is, unhealthy otherwise. `degraded` components do not count.
pub fn overall_status(statuses: &[HealthStatus]) -> HealthStatus {
    match statuses.iter().filter(|s| s.is_failing()).count() {
        0 => HealthStatus::Healthy,
        1 => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

/// A component self-test awaiting execution.
pub type Probe<'a> = (Component, Pin<Box<dyn Future<Output = ComponentHealth> + Send + 'a>>);

/// Run all probes concurrently, each bounded by `timeout`.
pub async fn run_probes(probes: Vec<Probe<'_>>, timeout: Duration) -> HealthReport {
    let results = futures_util::future::join_all(probes.into_iter().map(|(component, probe)| {
        async move {
            match tokio::time::timeout(timeout, probe).await {
                Ok(health) => health,
                Err(_) => ComponentHealth::timeout(component, timeout),
            }
        }
    }))
    .await;
    HealthReport::from_components(results)
}
