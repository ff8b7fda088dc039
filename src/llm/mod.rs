//! Inference provider abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities; clone them freely.
//! Async is delegated to the underlying provider, so callers need no
//! trait-object machinery.

pub mod providers;

use crate::error::ProviderError;

/// One completion. `tokens` is the provider's count when reported,
/// otherwise an estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub tokens: u64,
}

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Ollama(providers::ollama::OllamaProvider),
    Dummy(providers::dummy::DummyProvider),
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Ollama(_) => "ollama",
            LlmProvider::Dummy(_) => "dummy",
        }
    }

    /// Single prompt → single completion. Empty completions are errors.
    pub async fn complete(&self, prompt: &str) -> Result<LlmResponse, ProviderError> {
        match self {
            LlmProvider::Ollama(p) => p.complete(prompt).await,
            LlmProvider::Dummy(p) => p.complete(prompt).await,
        }
    }

    /// Cheap reachability check; never runs inference.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        match self {
            LlmProvider::Ollama(p) => p.probe().await,
            LlmProvider::Dummy(p) => p.probe().await,
        }
    }
}

/// Rough token count (1.3 per word, rounded up) for providers that do not
/// report one.
pub fn estimate_tokens(text: &str) -> u64 {
    let words = text.split_whitespace().count() as u64;
    (words * 13).div_ceil(10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_estimate_scales_with_words() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }
}
