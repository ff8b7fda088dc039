//! Logging via tracing-subscriber, to stderr so stdout stays pure JSON.
//!
//! HTML parsing and HTTP client crates are held at `warn` unless `RUST_LOG`
//! names them explicitly; at `debug` they drown out the per-stage lines.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::AppError;

/// Crates quieted below the chosen level.
const QUIET_TARGETS: &[&str] = &["html5ever", "selectors", "hyper", "hyper_util", "reqwest", "rustls"];

/// Initialise the global subscriber. Call once, after the level is resolved.
///
/// When `level` came from `-v` flags (`prefer_level`), it beats `RUST_LOG`.
/// Otherwise `RUST_LOG` beats the configured level.
pub fn init(level: &str, prefer_level: bool) -> Result<(), AppError> {
    let filter = match std::env::var("RUST_LOG").ok().filter(|v| !v.trim().is_empty()) {
        Some(env) if !prefer_level => EnvFilter::try_new(&env)
            .map_err(|e| AppError::Logger(format!("invalid RUST_LOG '{env}': {e}")))?,
        _ => build_filter(level)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// `level` for sift, capped at `warn` for the noisy dependencies.
fn build_filter(level: &str) -> Result<EnvFilter, AppError> {
    let parsed = parse_level(level)?;
    let mut directives = vec![parsed.to_string().to_lowercase()];
    if parsed > LevelFilter::WARN {
        directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    }
    EnvFilter::try_new(directives.join(","))
        .map_err(|e| AppError::Logger(format!("invalid log filter for '{level}': {e}")))
}

/// Parse a level name, rejecting anything tracing does not know.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.trim().is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_levels_parse() {
        for l in &["error", "warn", "info", "debug", "trace", "off"] {
            assert!(parse_level(l).is_ok(), "expected '{l}' to be valid");
        }
    }

    #[test]
    fn invalid_level_errors() {
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("  ").is_err());
    }

    #[test]
    fn debug_filter_quiets_dependencies() {
        let filter = build_filter("debug").unwrap().to_string();
        assert!(filter.contains("html5ever=warn"), "{filter}");
        assert!(filter.contains("debug"));
        let quiet = build_filter("error").unwrap().to_string();
        assert!(!quiet.contains("html5ever"), "{quiet}");
    }

    #[test]
    fn init_succeeds_or_already_init() {
        // Another test in the same process may have installed a subscriber first.
        match init("info", true) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) if msg.contains("set subscriber") => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
