//! Two-tier namespaced cache.
//!
//! ```text
//!  get ──▶ memory tier ──miss──▶ backing tier ──hit──▶ promote to memory
//!  set ──▶ memory tier + backing tier (backing failures are logged only)
//! ```
//!
//! Keys are `"<namespace>:" + hex(sha256(subject))`. The memory tier is
//! authoritative for availability, the backing tier for sharing across
//! processes. Every backing-tier error is swallowed here.

mod backing;
mod memory;

pub use backing::{KvBackend, SqliteKv};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{CacheConfig, CacheTtls};
use crate::error::AppError;
use crate::health::{Component, ComponentHealth};
use memory::MemoryTier;

/// Logical partition of the key space, each with its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Response,
    Search,
    Enhancement,
    Content,
    Cost,
    General,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Response => "response",
            Namespace::Search => "search",
            Namespace::Enhancement => "enhancement",
            Namespace::Content => "content",
            Namespace::Cost => "cost",
            Namespace::General => "general",
        }
    }

    fn ttl(&self, ttls: &CacheTtls) -> Duration {
        match self {
            Namespace::Response => ttls.response,
            Namespace::Search => ttls.search,
            Namespace::Enhancement => ttls.enhancement,
            Namespace::Content => ttls.content,
            Namespace::Cost => ttls.cost,
            Namespace::General => ttls.general,
        }
    }
}

/// Counters exposed by [`Cache::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub backing_enabled: bool,
    pub memory_hits: u64,
    pub backing_hits: u64,
    pub misses: u64,
}

pub struct Cache {
    memory: Mutex<MemoryTier>,
    backing: Option<Arc<dyn KvBackend>>,
    ttls: CacheTtls,
    health_timeout: Duration,
    memory_hits: AtomicU64,
    backing_hits: AtomicU64,
    misses: AtomicU64,
}

impl Cache {
    pub fn new(cfg: &CacheConfig, backing: Option<Arc<dyn KvBackend>>) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(cfg.memory_capacity)),
            backing,
            ttls: cfg.ttl.clone(),
            health_timeout: cfg.health_timeout,
            memory_hits: AtomicU64::new(0),
            backing_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build from config, opening the SQLite backing tier when one is
    /// configured. A backing tier that fails to open leaves the cache
    /// memory-only.
    pub fn open(cfg: &CacheConfig) -> Self {
        let backing = cfg.backing_path.as_ref().and_then(|path| match SqliteKv::open(path) {
            Ok(kv) => {
                debug!(path = %path.display(), "cache backing tier ready");
                Some(Arc::new(kv) as Arc<dyn KvBackend>)
            }
            Err(e) => {
                warn!(error = %e, "cache backing tier unavailable, running memory-only");
                None
            }
        });
        Self::new(cfg, backing)
    }

    /// Derive the storage key for `subject` in `ns`.
    pub fn key(ns: Namespace, subject: &str) -> String {
        let digest = Sha256::digest(subject.as_bytes());
        format!("{}:{}", ns.as_str(), hex::encode(digest))
    }

    pub fn ttl(&self, ns: Namespace) -> Duration {
        ns.ttl(&self.ttls)
    }

    pub async fn get(&self, subject: &str, ns: Namespace) -> Option<String> {
        let key = Self::key(ns, subject);

        if let Some(value) = self.lock_memory().get(&key) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        let Some(backing) = self.backing.clone() else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        let lookup_key = key.clone();
        let found = match tokio::task::spawn_blocking(move || backing.get(&lookup_key)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(namespace = ns.as_str(), error = %e, "cache backing read failed");
                None
            }
            Err(e) => {
                warn!(namespace = ns.as_str(), error = %e, "cache backing read task failed");
                None
            }
        };

        match found {
            Some((value, expires_at)) => {
                let remaining = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                if remaining.is_zero() {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                self.lock_memory().insert(
                    key,
                    value.clone(),
                    tokio::time::Instant::now() + remaining,
                );
                self.backing_hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Write both tiers. `ttl` of `None` uses the namespace default.
    pub async fn set(&self, subject: &str, value: String, ttl: Option<Duration>, ns: Namespace) {
        let key = Self::key(ns, subject);
        let ttl = ttl.unwrap_or_else(|| self.ttl(ns));
        self.lock_memory().insert(key.clone(), value.clone(), tokio::time::Instant::now() + ttl);

        let Some(backing) = self.backing.clone() else { return };
        let expires_at = match chrono::Duration::from_std(ttl) {
            Ok(d) => Utc::now() + d,
            Err(e) => {
                warn!(namespace = ns.as_str(), error = %e, "cache ttl out of range, memory only");
                return;
            }
        };
        match tokio::task::spawn_blocking(move || backing.set(&key, &value, expires_at)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(namespace = ns.as_str(), error = %e, "cache backing write failed"),
            Err(e) => warn!(namespace = ns.as_str(), error = %e, "cache backing write task failed"),
        }
    }

    pub async fn delete(&self, subject: &str, ns: Namespace) {
        let key = Self::key(ns, subject);
        self.lock_memory().remove(&key);
        if let Some(backing) = self.backing.clone() {
            match tokio::task::spawn_blocking(move || backing.delete(&key)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "cache backing delete failed"),
                Err(e) => warn!(error = %e, "cache backing delete task failed"),
            }
        }
    }

    /// Typed read; a value that no longer deserialises is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, subject: &str, ns: Namespace) -> Option<T> {
        let raw = self.get(subject, ns).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(namespace = ns.as_str(), error = %e, "cached value failed to deserialize");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        subject: &str,
        value: &T,
        ttl: Option<Duration>,
        ns: Namespace,
    ) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(subject, raw, ttl, ns).await,
            Err(e) => warn!(namespace = ns.as_str(), error = %e, "cache value failed to serialize"),
        }
    }

    /// Remove keys containing `pattern` from both tiers, or everything.
    /// Returns the number of memory entries dropped.
    pub async fn clear(&self, pattern: Option<&str>) -> usize {
        let dropped = self.lock_memory().clear(pattern);
        if let Some(backing) = self.backing.clone() {
            let pattern = pattern.map(str::to_string);
            match tokio::task::spawn_blocking(move || backing.clear(pattern.as_deref())).await {
                Ok(Ok(n)) => debug!(removed = n, "cache backing cleared"),
                Ok(Err(e)) => warn!(error = %e, "cache backing clear failed"),
                Err(e) => warn!(error = %e, "cache backing clear task failed"),
            }
        }
        dropped
    }

    pub fn stats(&self) -> CacheStats {
        let memory = self.lock_memory();
        CacheStats {
            memory_entries: memory.len(),
            memory_capacity: memory.capacity(),
            backing_enabled: self.backing.is_some(),
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            backing_hits: self.backing_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Synthetic set/get/delete round trip against the backing tier.
    pub async fn health(&self) -> ComponentHealth {
        let Some(backing) = self.backing.clone() else {
            return ComponentHealth::degraded(Component::Cache, "memory tier only");
        };
        let probe = tokio::task::spawn_blocking(move || round_trip(backing.as_ref()));
        match tokio::time::timeout(self.health_timeout, probe).await {
            Ok(Ok(Ok(()))) => ComponentHealth::ok(Component::Cache),
            Ok(Ok(Err(e))) => ComponentHealth::degraded(
                Component::Cache,
                format!("backing tier failed round trip: {e}"),
            ),
            Ok(Err(e)) => ComponentHealth::degraded(Component::Cache, format!("probe task failed: {e}")),
            Err(_) => ComponentHealth::timeout(Component::Cache, self.health_timeout),
        }
    }

    fn lock_memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn round_trip(backing: &dyn KvBackend) -> Result<(), AppError> {
    let key = format!("general:health-{}", uuid::Uuid::new_v4());
    backing.set(&key, "ok", Utc::now() + chrono::Duration::seconds(10))?;
    let read = backing.get(&key)?;
    backing.delete(&key)?;
    match read {
        Some((value, _)) if value == "ok" => Ok(()),
        _ => Err(AppError::Store("health value did not round trip".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::health::HealthStatus;
    use crate::types::Response;
    use tempfile::TempDir;

    /// Backing tier whose every call fails.
    struct BrokenKv;

    impl KvBackend for BrokenKv {
        fn get(&self, _: &str) -> Result<Option<(String, chrono::DateTime<Utc>)>, AppError> {
            Err(AppError::Store("connection refused".into()))
        }
        fn set(&self, _: &str, _: &str, _: chrono::DateTime<Utc>) -> Result<(), AppError> {
            Err(AppError::Store("connection refused".into()))
        }
        fn delete(&self, _: &str) -> Result<(), AppError> {
            Err(AppError::Store("connection refused".into()))
        }
        fn clear(&self, _: Option<&str>) -> Result<usize, AppError> {
            Err(AppError::Store("connection refused".into()))
        }
    }

    fn sqlite_cache() -> (TempDir, Cache) {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let cache = Cache::open(&cfg.cache);
        (tmp, cache)
    }

    #[test]
    fn keys_are_namespaced_hashes() {
        let key = Cache::key(Namespace::Response, "climate policy");
        assert!(key.starts_with("response:"));
        assert_eq!(key.len(), "response:".len() + 64);
        assert_ne!(key, Cache::key(Namespace::Search, "climate policy"));
    }

    #[tokio::test]
    async fn response_round_trip_is_idempotent() {
        let (_tmp, cache) = sqlite_cache();
        let response = Response::new("q", "answer".into(), vec!["https://a".into()], 0.8);
        cache.set_json("q", &response, None, Namespace::Response).await;

        let first: Response = cache.get_json("q", Namespace::Response).await.unwrap();
        let second: Response = cache.get_json("q", Namespace::Response).await.unwrap();
        assert_eq!(first, response);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn backing_hit_repopulates_memory() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let writer = Cache::open(&cfg.cache);
        writer.set("subject", "v".into(), None, Namespace::General).await;

        // A second instance shares only the backing file.
        let reader = Cache::open(&cfg.cache);
        assert_eq!(reader.stats().memory_entries, 0);
        assert_eq!(reader.get("subject", Namespace::General).await.as_deref(), Some("v"));
        assert_eq!(reader.stats().memory_entries, 1);
        assert_eq!(reader.stats().backing_hits, 1);
    }

    #[tokio::test]
    async fn expired_backing_row_is_absent() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let kv = SqliteKv::open(cfg.cache.backing_path.as_ref().unwrap()).unwrap();
        let key = Cache::key(Namespace::Search, "stale");
        kv.set(&key, "old", Utc::now() - chrono::Duration::seconds(5)).unwrap();

        let cache = Cache::new(&cfg.cache, Some(Arc::new(kv)));
        assert_eq!(cache.get("stale", Namespace::Search).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn memory_entry_expires_after_ttl() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let cache = Cache::new(&cfg.cache, None);
        cache.set("k", "v".into(), Some(Duration::from_secs(30)), Namespace::General).await;
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cache.get("k", Namespace::General).await.is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k", Namespace::General).await.is_none());
    }

    #[tokio::test]
    async fn broken_backing_never_fails_calls() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let cache = Cache::new(&cfg.cache, Some(Arc::new(BrokenKv)));
        cache.set("k", "v".into(), None, Namespace::General).await;
        assert_eq!(cache.get("k", Namespace::General).await.as_deref(), Some("v"));
        assert_eq!(cache.get("other", Namespace::General).await, None);
        assert_eq!(cache.clear(None).await, 1);
        assert_eq!(cache.health().await.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn clear_by_namespace_pattern() {
        let (_tmp, cache) = sqlite_cache();
        cache.set("a", "1".into(), None, Namespace::Search).await;
        cache.set("b", "1".into(), None, Namespace::Search).await;
        cache.set("a", "1".into(), None, Namespace::Content).await;
        assert_eq!(cache.clear(Some("search:")).await, 2);
        assert!(cache.get("a", Namespace::Search).await.is_none());
        assert!(cache.get("a", Namespace::Content).await.is_some());
    }

    #[tokio::test]
    async fn health_round_trip_succeeds_on_sqlite() {
        let (_tmp, cache) = sqlite_cache();
        assert_eq!(cache.health().await.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn memory_only_cache_reports_degraded() {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::test_default(tmp.path()).unwrap();
        let cache = Cache::new(&cfg.cache, None);
        assert_eq!(cache.health().await.status, HealthStatus::Degraded);
        assert!(!cache.stats().backing_enabled);
    }
}
