//! Application-wide error types.
//!
//! Three layers:
//!
//! * [`AppError`]: startup and infrastructure failures (config, logger,
//!   stores). Only the binary ever surfaces these.
//! * [`PipelineError`]: what a caller of [`Pipeline::process`] can see.
//!   Budget rejection is the only hard stop in normal operation.
//! * [`StageError`]: soft, per-stage failures. The orchestrator turns every
//!   one of these into the stage's fallback value.
//!
//! [`ProviderError`] covers single outbound HTTP calls; components log it and
//! fall back without surfacing it further.
//!
//! [`Pipeline::process`]: crate::pipeline::Pipeline::process

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-visible pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The day's spend already reached the ceiling. Retry tomorrow.
    #[error("daily budget exhausted: spent ${spent:.4} of ${ceiling:.2}")]
    BudgetExceeded { spent: f64, ceiling: f64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A stage's own fallback could not produce a value.
    #[error("pipeline failure: {0}")]
    Failure(String),
}

impl PipelineError {
    /// `true` when the same request may succeed later without changes.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::BudgetExceeded { .. })
    }
}

/// Failure of a single call to an external HTTP service (search provider,
/// page source, inference server).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

/// Soft failure of a single stage.
#[derive(Debug, Clone, Error)]
pub enum StageError {
    #[error("stage '{stage}' exceeded its {budget:?} budget")]
    Timeout { stage: &'static str, budget: Duration },

    #[error("stage '{stage}' failed: {reason}")]
    Failure { stage: &'static str, reason: String },
}

impl StageError {
    pub fn failure(stage: &'static str, reason: impl Into<String>) -> Self {
        StageError::Failure { stage, reason: reason.into() }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StageError::Timeout { .. })
    }
}
