//! Dummy inference provider: echoes the prompt back prefixed with `[echo]`.
//! Used for testing the full pipeline without an inference server.
//!
//! Builders switch it to a canned reply, make it unreachable, or make its
//! first few calls fail. The call counter is shared across clones.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::ProviderError;
use crate::llm::{LlmResponse, estimate_tokens};

#[derive(Debug, Clone)]
pub struct DummyProvider {
    reachable: bool,
    reply: Option<String>,
    fail_first: u32,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>,
}

impl Default for DummyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyProvider {
    pub fn new() -> Self {
        Self { reachable: true, reply: None, fail_first: 0, delay: None, calls: Arc::default() }
    }

    /// Probe and every completion fail as if the server were down.
    pub fn unreachable() -> Self {
        Self { reachable: false, ..Self::new() }
    }

    /// Answer every prompt with `reply`.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// The first `n` completions return an HTTP 500.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    /// Sleep before every completion.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Completions attempted so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub async fn probe(&self) -> Result<(), ProviderError> {
        if self.reachable {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("dummy provider is unreachable".into()))
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<LlmResponse, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.reachable {
            return Err(ProviderError::Http("connection refused".into()));
        }
        if call < self.fail_first {
            return Err(ProviderError::Status { status: 500, body: "model loading".into() });
        }
        let text = match &self.reply {
            Some(reply) => reply.clone(),
            None => format!("[echo] {prompt}"),
        };
        let tokens = estimate_tokens(prompt) + estimate_tokens(&text);
        Ok(LlmResponse { text, tokens })
    }
}
