//! Shared backing tier.
//!
//! Expiry is stored as wall-clock milliseconds so several processes can share
//! one file. Readers treat an expired row as absent and delete it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};

use crate::error::AppError;
use crate::store::{ensure_parent, open_conn};

/// Blocking key-value store shared across processes.
pub trait KvBackend: Send + Sync {
    /// Live `(value, expires_at)` for `key`. Expired rows read as `None`.
    fn get(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError>;

    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<(), AppError>;

    fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Remove keys containing `pattern`, or all keys. Returns rows removed.
    fn clear(&self, pattern: Option<&str>) -> Result<usize, AppError>;
}

/// SQLite [`KvBackend`]: one `kv` table, connection per operation.
#[derive(Debug, Clone)]
pub struct SqliteKv {
    db_path: PathBuf,
}

impl SqliteKv {
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        ensure_parent(db_path)?;
        let conn = open_conn(db_path)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv(expires_at);
            ",
        )
        .map_err(|e| AppError::Store(format!("cache: initialize schema: {e}")))?;
        Ok(Self { db_path: db_path.to_path_buf() })
    }
}

impl KvBackend for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<(String, DateTime<Utc>)>, AppError> {
        let conn = open_conn(&self.db_path)?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| AppError::Store(format!("cache: get {key}: {e}")))?;

        let Some((value, expires_ms)) = row else { return Ok(None) };
        let now_ms = Utc::now().timestamp_millis();
        if expires_ms <= now_ms {
            conn.execute("DELETE FROM kv WHERE key = ?1 AND expires_at <= ?2", params![key, now_ms])
                .map_err(|e| AppError::Store(format!("cache: evict {key}: {e}")))?;
            return Ok(None);
        }
        let expires_at = DateTime::from_timestamp_millis(expires_ms)
            .ok_or_else(|| AppError::Store(format!("cache: bad expiry {expires_ms} for {key}")))?;
        Ok(Some((value, expires_at)))
    }

    fn set(&self, key: &str, value: &str, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let conn = open_conn(&self.db_path)?;
        conn.execute(
            "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![key, value, expires_at.timestamp_millis()],
        )
        .map_err(|e| AppError::Store(format!("cache: set {key}: {e}")))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        let conn = open_conn(&self.db_path)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| AppError::Store(format!("cache: delete {key}: {e}")))?;
        Ok(())
    }

    fn clear(&self, pattern: Option<&str>) -> Result<usize, AppError> {
        let conn = open_conn(&self.db_path)?;
        let removed = match pattern {
            Some(p) => conn.execute("DELETE FROM kv WHERE instr(key, ?1) > 0", params![p]),
            None => conn.execute("DELETE FROM kv", []),
        }
        .map_err(|e| AppError::Store(format!("cache: clear: {e}")))?;
        Ok(removed)
    }
}
