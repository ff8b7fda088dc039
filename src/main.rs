//! Sift command-line entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Open the ledger store and spawn the journal
//!   6. Build the pipeline
//!   7. Run one query (or the health check) until done or Ctrl-C
//!   8. Flush the journal, cancel it, join it

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sift::config;
use sift::error::AppError;
use sift::logger;
use sift::pipeline::Pipeline;
use sift::store::journal::Journal;
use sift::store::{LedgerStore, SqliteStore};
use sift::types::DEFAULT_MAX_RESULTS;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

enum Command {
    Query(String),
    Health,
}

struct CliArgs {
    command: Command,
    max_results: usize,
    user_id: Option<String>,
    log_level: Option<&'static str>,
    config_path: Option<String>,
}

async fn run() -> Result<i32, AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();
    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        service = %config.service_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let store: Arc<dyn LedgerStore> = Arc::new(SqliteStore::open(&config.store_path)?);
    let shutdown = CancellationToken::new();
    let (journal, journal_task) = Journal::spawn(Arc::clone(&store), shutdown.clone());
    let pipeline = Arc::new(Pipeline::build(&config, store, journal.clone())?);

    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let outcome = tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(AppError::Io(std::io::ErrorKind::Interrupted.into())),
        out = execute(&pipeline, &args) => out,
    };

    journal.flush().await;
    shutdown.cancel();
    if let Err(e) = journal_task.await {
        warn!(error = %e, "journal task did not shut down cleanly");
    }
    outcome
}

/// Exit code 0 on an answer or a healthy/degraded report, 2 on a pipeline
/// error or an unhealthy report.
async fn execute(pipeline: &Pipeline, args: &CliArgs) -> Result<i32, AppError> {
    match &args.command {
        Command::Health => {
            let report = pipeline.health().await;
            print_json(&report)?;
            Ok(if report.overall == sift::health::HealthStatus::Unhealthy { 2 } else { 0 })
        }
        Command::Query(query) => {
            match pipeline.process(query, args.user_id.as_deref(), args.max_results).await {
                Ok(response) => {
                    print_json(&response)?;
                    Ok(0)
                }
                Err(e) => {
                    let body = serde_json::json!({ "error": e.to_string(), "retryable": e.is_retryable() });
                    print_json(&body)?;
                    Ok(2)
                }
            }
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| AppError::Io(e.into()))?;
    println!("{json}");
    Ok(())
}

fn usage() {
    println!("Usage: sift [OPTIONS] <QUERY...>");
    println!();
    println!("Options:");
    println!("  -h, --help                 Print help");
    println!("      --health               Print the component health report and exit");
    println!("  -n, --max-results <N>      Results to search and extract (1-20, default {DEFAULT_MAX_RESULTS})");
    println!("  -u, --user <ID>            Attribute the request to a user id");
    println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
    println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
}

fn required_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> String {
    iter.next().unwrap_or_else(|| {
        eprintln!("error: {flag} requires an argument");
        std::process::exit(1);
    })
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut health = false;
    let mut max_results = DEFAULT_MAX_RESULTS;
    let mut user_id = None;
    let mut config_path = None;
    let mut words: Vec<String> = Vec::new();

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            words.extend(iter.by_ref());
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                usage();
                std::process::exit(0);
            }
            "--health" => health = true,
            "-n" | "--max-results" => {
                let raw = required_value(&mut iter, "--max-results");
                max_results = raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: --max-results expects a number, got '{raw}'");
                    std::process::exit(1);
                });
            }
            "-u" | "--user" => user_id = Some(required_value(&mut iter, "--user")),
            "-f" | "--config" => config_path = Some(required_value(&mut iter, "-f/--config")),
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            a if a.starts_with('-') && a.len() > 1 => {
                eprintln!("error: unknown option '{a}'");
                std::process::exit(1);
            }
            other => words.push(other.to_string()),
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (per-stage and per-provider diagnostics)
    //   -vvvv+  → trace  (full prompts)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    let command = if health {
        Command::Health
    } else if words.is_empty() {
        usage();
        std::process::exit(1);
    } else {
        Command::Query(words.join(" "))
    };

    CliArgs { command, max_results, user_id, log_level, config_path }
}
