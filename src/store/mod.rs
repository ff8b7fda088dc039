//! Persistence collaborator for the request log and cost ledger.
//!
//! [`LedgerStore`] is a synchronous trait; async callers reach it only
//! through the [`journal`] background task or `spawn_blocking`. The SQLite
//! implementation opens a fresh connection per operation, so one store can be
//! shared freely across tasks.

pub mod journal;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::AppError;
use crate::ledger::{CostStatus, DailyAggregate, Provider, ProviderUnits, RequestCost};

// ── Row types ─────────────────────────────────────────────────────────────────

/// A request entering the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestStart {
    pub request_id: String,
    pub query: String,
    pub user_id: Option<String>,
    pub at: DateTime<Utc>,
}

/// Terminal status of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub request_id: String,
    pub status: CostStatus,
    pub processing_time_seconds: f64,
    pub cached: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// One billed call.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub request_id: String,
    pub provider: Provider,
    pub units: u64,
    pub cost: f64,
    pub at: DateTime<Utc>,
}

/// Additive change to one day's aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyDelta {
    pub date: NaiveDate,
    pub requests: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub cost: f64,
    pub units: ProviderUnits,
}

// ── Store trait ───────────────────────────────────────────────────────────────

/// Blocking persistence interface.
pub trait LedgerStore: Send + Sync {
    fn request_started(&self, start: &RequestStart) -> Result<(), AppError>;

    fn request_finished(&self, outcome: &RequestOutcome) -> Result<(), AppError>;

    fn record_usage(&self, usage: &UsageRecord) -> Result<(), AppError>;

    fn record_cost(&self, cost: &RequestCost) -> Result<(), AppError>;

    /// Fold `delta` into the stored aggregate for `delta.date`.
    fn add_daily(&self, delta: &DailyDelta) -> Result<(), AppError>;

    fn load_daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, AppError>;

    fn load_request_cost(&self, request_id: &str) -> Result<Option<RequestCost>, AppError>;

    /// Cheap liveness check.
    fn ping(&self) -> Result<(), AppError>;
}

// ── SQLite ────────────────────────────────────────────────────────────────────

/// Schema version stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Open a SQLite connection to `db_path` with WAL and a busy timeout.
pub(crate) fn open_conn(db_path: &Path) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Store(format!("open {}: {e}", db_path.display())))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Store(format!("set journal_mode WAL: {e}")))?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .map_err(|e| AppError::Store(format!("set busy_timeout: {e}")))?;
    Ok(conn)
}

/// Create the parent directory of `path` if it does not exist yet.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub(crate) fn to_rfc3339(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| AppError::Store(format!("bad timestamp '{raw}': {e}")))
}

fn init_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS requests (
            request_id TEXT PRIMARY KEY,
            query TEXT NOT NULL,
            user_id TEXT,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            processing_time REAL,
            cached INTEGER NOT NULL DEFAULT 0,
            error TEXT
        );

        CREATE TABLE IF NOT EXISTS api_usage (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            request_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            units INTEGER NOT NULL,
            cost REAL NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_api_usage_request ON api_usage(request_id);

        CREATE TABLE IF NOT EXISTS cost_records (
            request_id TEXT PRIMARY KEY,
            user_id TEXT,
            brave_search INTEGER NOT NULL,
            serpapi INTEGER NOT NULL,
            content_proxy INTEGER NOT NULL,
            inference_tokens INTEGER NOT NULL,
            total_cost REAL NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_stats (
            date TEXT PRIMARY KEY,
            total_requests INTEGER NOT NULL DEFAULT 0,
            cache_hits INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            total_cost REAL NOT NULL DEFAULT 0,
            brave_search INTEGER NOT NULL DEFAULT 0,
            serpapi INTEGER NOT NULL DEFAULT 0,
            content_proxy INTEGER NOT NULL DEFAULT 0,
            inference_tokens INTEGER NOT NULL DEFAULT 0
        );

        PRAGMA user_version = 1;
        ",
    )
    .map_err(|e| AppError::Store(format!("initialize schema: {e}")))
}

/// SQLite-backed [`LedgerStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and apply the schema.
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        ensure_parent(db_path)?;
        let conn = open_conn(db_path)?;
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| AppError::Store(format!("read user_version: {e}")))?;
        if version < SCHEMA_VERSION {
            init_schema(&conn)?;
        }
        Ok(Self { db_path: db_path.to_path_buf() })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open_conn(&self) -> Result<Connection, AppError> {
        open_conn(&self.db_path)
    }
}

impl LedgerStore for SqliteStore {
    fn request_started(&self, start: &RequestStart) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO requests (request_id, query, user_id, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                start.request_id,
                start.query,
                start.user_id,
                CostStatus::Active.as_str(),
                to_rfc3339(&start.at),
            ],
        )
        .map_err(|e| AppError::Store(format!("insert request {}: {e}", start.request_id)))?;
        Ok(())
    }

    fn request_finished(&self, outcome: &RequestOutcome) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "UPDATE requests
             SET status = ?2, finished_at = ?3, processing_time = ?4, cached = ?5, error = ?6
             WHERE request_id = ?1",
            params![
                outcome.request_id,
                outcome.status.as_str(),
                to_rfc3339(&outcome.at),
                outcome.processing_time_seconds,
                outcome.cached,
                outcome.error,
            ],
        )
        .map_err(|e| AppError::Store(format!("update request {}: {e}", outcome.request_id)))?;
        Ok(())
    }

    fn record_usage(&self, usage: &UsageRecord) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.execute(
            "INSERT INTO api_usage (request_id, provider, units, cost, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                usage.request_id,
                usage.provider.as_str(),
                usage.units as i64,
                usage.cost,
                to_rfc3339(&usage.at),
            ],
        )
        .map_err(|e| AppError::Store(format!("insert usage: {e}")))?;
        Ok(())
    }

    fn record_cost(&self, cost: &RequestCost) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let u = &cost.units;
        conn.execute(
            "INSERT OR REPLACE INTO cost_records
             (request_id, user_id, brave_search, serpapi, content_proxy, inference_tokens,
              total_cost, status, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                cost.request_id,
                cost.user_id,
                u.brave_search as i64,
                u.serpapi as i64,
                u.content_proxy as i64,
                u.inference_tokens as i64,
                cost.total_cost,
                cost.status.as_str(),
                to_rfc3339(&cost.started_at),
            ],
        )
        .map_err(|e| AppError::Store(format!("insert cost record {}: {e}", cost.request_id)))?;
        Ok(())
    }

    fn add_daily(&self, delta: &DailyDelta) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        let u = &delta.units;
        conn.execute(
            "INSERT INTO daily_stats
             (date, total_requests, cache_hits, errors, total_cost,
              brave_search, serpapi, content_proxy, inference_tokens)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(date) DO UPDATE SET
                total_requests = total_requests + excluded.total_requests,
                cache_hits = cache_hits + excluded.cache_hits,
                errors = errors + excluded.errors,
                total_cost = total_cost + excluded.total_cost,
                brave_search = brave_search + excluded.brave_search,
                serpapi = serpapi + excluded.serpapi,
                content_proxy = content_proxy + excluded.content_proxy,
                inference_tokens = inference_tokens + excluded.inference_tokens",
            params![
                delta.date.to_string(),
                delta.requests as i64,
                delta.cache_hits as i64,
                delta.errors as i64,
                delta.cost,
                u.brave_search as i64,
                u.serpapi as i64,
                u.content_proxy as i64,
                u.inference_tokens as i64,
            ],
        )
        .map_err(|e| AppError::Store(format!("upsert daily stats {}: {e}", delta.date)))?;
        Ok(())
    }

    fn load_daily(&self, date: NaiveDate) -> Result<Option<DailyAggregate>, AppError> {
        let conn = self.open_conn()?;
        conn.query_row(
            "SELECT total_requests, cache_hits, errors, total_cost,
                    brave_search, serpapi, content_proxy, inference_tokens
             FROM daily_stats WHERE date = ?1",
            params![date.to_string()],
            |row| {
                Ok(DailyAggregate {
                    date,
                    requests: row.get::<_, i64>(0)? as u64,
                    cache_hits: row.get::<_, i64>(1)? as u64,
                    errors: row.get::<_, i64>(2)? as u64,
                    total_cost: row.get(3)?,
                    units: ProviderUnits {
                        brave_search: row.get::<_, i64>(4)? as u64,
                        serpapi: row.get::<_, i64>(5)? as u64,
                        content_proxy: row.get::<_, i64>(6)? as u64,
                        inference_tokens: row.get::<_, i64>(7)? as u64,
                    },
                })
            },
        )
        .optional()
        .map_err(|e| AppError::Store(format!("load daily stats {date}: {e}")))
    }

    fn load_request_cost(&self, request_id: &str) -> Result<Option<RequestCost>, AppError> {
        let conn = self.open_conn()?;
        let row = conn
            .query_row(
                "SELECT user_id, brave_search, serpapi, content_proxy, inference_tokens,
                        total_cost, status, started_at
                 FROM cost_records WHERE request_id = ?1",
                params![request_id],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        ProviderUnits {
                            brave_search: row.get::<_, i64>(1)? as u64,
                            serpapi: row.get::<_, i64>(2)? as u64,
                            content_proxy: row.get::<_, i64>(3)? as u64,
                            inference_tokens: row.get::<_, i64>(4)? as u64,
                        },
                        row.get::<_, f64>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| AppError::Store(format!("load cost record {request_id}: {e}")))?;

        let Some((user_id, units, total_cost, status, started_at)) = row else {
            return Ok(None);
        };
        Ok(Some(RequestCost {
            request_id: request_id.to_string(),
            user_id,
            units,
            total_cost,
            status: CostStatus::parse(&status)
                .ok_or_else(|| AppError::Store(format!("unknown cost status '{status}'")))?,
            started_at: parse_rfc3339(&started_at)?,
        }))
    }

    fn ping(&self) -> Result<(), AppError> {
        let conn = self.open_conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Store(format!("ping: {e}")))?;
        Ok(())
    }
}
