//! Fixed search provider: returns a canned result list.
//! Used to run the full pipeline without network access or API keys.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::RawHit;
use crate::error::ProviderError;
use crate::ledger::Provider;

#[derive(Debug, Clone)]
pub struct FixedSearch {
    name: String,
    hits: Vec<RawHit>,
    fail: bool,
    panic: bool,
    delay: Option<Duration>,
    billing: Option<Provider>,
    calls: Arc<AtomicUsize>,
}

impl FixedSearch {
    pub fn new(name: impl Into<String>, hits: Vec<RawHit>) -> Self {
        Self {
            name: name.into(),
            hits,
            fail: false,
            panic: false,
            delay: None,
            billing: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every call fails with an HTTP 503.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every call panics, as a provider with a bug would.
    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Charge successful calls to `provider`.
    pub fn billed_as(mut self, provider: Provider) -> Self {
        self.billing = Some(provider);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn billing(&self) -> Option<Provider> {
        self.billing
    }

    /// Calls made so far, across clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<RawHit>, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic {
            panic!("fixed search provider '{}' panicked", self.name);
        }
        if self.fail {
            return Err(ProviderError::Status { status: 503, body: "unavailable".into() });
        }
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}
