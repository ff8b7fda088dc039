//! Time-windowed memo: a value, the instant it was stored, and a TTL.
//!
//! Used by the inference availability probe and the composite health cache.
//! Reads past the TTL return `None`.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct Slot<T> {
    value: T,
    stored_at: Instant,
    ttl: Duration,
}

/// Thread-safe memo with per-write TTL.
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct TimedValue<T> {
    default_ttl: Duration,
    slot: Mutex<Option<Slot<T>>>,
}

impl<T: Clone> TimedValue<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self { default_ttl, slot: Mutex::new(None) }
    }

    /// Fresh value, or `None` when empty or expired.
    pub fn get(&self) -> Option<T> {
        let guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        guard
            .as_ref()
            .filter(|s| s.stored_at.elapsed() < s.ttl)
            .map(|s| s.value.clone())
    }

    pub fn set(&self, value: T) {
        self.set_with_ttl(value, self.default_ttl);
    }

    /// Store `value` with a TTL other than the default (e.g. a failure cooldown).
    pub fn set_with_ttl(&self, value: T, ttl: Duration) {
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Slot { value, stored_at: Instant::now(), ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn value_expires_after_ttl() {
        let memo = TimedValue::new(Duration::from_secs(60));
        memo.set(true);
        assert_eq!(memo.get(), Some(true));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(memo.get(), Some(true));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(memo.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_ttl_overrides_default() {
        let memo = TimedValue::new(Duration::from_secs(60));
        memo.set_with_ttl(false, Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(memo.get(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_restarts_the_window() {
        let memo = TimedValue::new(Duration::from_secs(10));
        memo.set(1u32);
        tokio::time::advance(Duration::from_secs(8)).await;
        memo.set(2);
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(memo.get(), Some(2));
    }
}
