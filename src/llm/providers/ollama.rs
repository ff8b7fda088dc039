//! Ollama completion provider (`/api/generate`, non-streaming).
//!
//! All Ollama wire types are private to this module. Every call builds its
//! own `reqwest::Client`, so a retry never reuses a connection that just
//! failed.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::OllamaConfig;
use crate::error::ProviderError;
use crate::llm::{LlmResponse, estimate_tokens};
use crate::search::providers::check_status;

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    host: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
    probe_timeout: Duration,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
            probe_timeout: config.probe_timeout,
        }
    }

    fn client(timeout: Duration) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(format!("failed to build HTTP client: {e}")))
    }

    /// Version endpoint, then model list. Both must answer 2xx within the
    /// probe timeout; the configured model need not be pulled yet.
    pub async fn probe(&self) -> Result<(), ProviderError> {
        let client = Self::client(self.probe_timeout)?;
        for path in ["/api/version", "/api/tags"] {
            let response = client.get(format!("{}{path}", self.host)).send().await.map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.probe_timeout)
                } else {
                    ProviderError::Unavailable(format!("{path}: {e}"))
                }
            })?;
            check_status(response).await?;
        }
        debug!(host = %self.host, "inference server reachable");
        Ok(())
    }

    pub async fn complete(&self, prompt: &str) -> Result<LlmResponse, ProviderError> {
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
                top_p: 0.9,
                top_k: 40,
            },
        };
        debug!(model = %self.model, prompt_len = prompt.len(), "sending inference request");
        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(prompt, "full inference prompt");
        }

        let client = Self::client(self.timeout)?;
        let response = client
            .post(format!("{}/api/generate", self.host))
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() { ProviderError::Timeout(self.timeout) } else { ProviderError::from(e) }
            })?;
        let response = check_status(response).await?;
        let body: GenerateResponse =
            response.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        into_response(prompt, body)
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
    top_k: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

fn into_response(prompt: &str, body: GenerateResponse) -> Result<LlmResponse, ProviderError> {
    let text = body.response.trim().to_string();
    if text.is_empty() {
        return Err(ProviderError::Parse("empty completion".into()));
    }
    let tokens = match (body.prompt_eval_count, body.eval_count) {
        (None, None) => estimate_tokens(prompt) + estimate_tokens(&text),
        (p, e) => p.unwrap_or(0) + e.unwrap_or(0),
    };
    Ok(LlmResponse { text, tokens })
}
