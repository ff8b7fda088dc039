//! Inference provider implementations.
//!
//! `build(config)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod ollama;

use crate::config::LlmConfig;
use crate::error::ProviderError;
use crate::llm::LlmProvider;

/// Construct the provider named by `[llm] default`.
pub fn build(config: &LlmConfig) -> Result<LlmProvider, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::new())),
        "ollama" => Ok(LlmProvider::Ollama(ollama::OllamaProvider::new(&config.ollama))),
        other => Err(ProviderError::Unavailable(format!("unknown llm provider: {other}"))),
    }
}
