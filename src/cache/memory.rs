//! Bounded in-process tier.
//!
//! Fixed capacity; on overflow the least-recently-*inserted* key is evicted
//! (reads do not refresh position, overwrites do). Expiry is checked lazily
//! on read.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;

#[derive(Debug)]
struct MemEntry {
    value: String,
    expires_at: Instant,
    seq: u64,
}

#[derive(Debug)]
pub(super) struct MemoryTier {
    capacity: usize,
    entries: HashMap<String, MemEntry>,
    /// Insertion order. Items whose `seq` no longer matches the live entry
    /// are stale and skipped.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl MemoryTier {
    pub(super) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    /// Live value for `key`; an expired entry is removed and reported absent.
    pub(super) fn get(&mut self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => entry.expires_at <= Instant::now(),
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    pub(super) fn insert(&mut self, key: String, value: String, expires_at: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key.clone(), MemEntry { value, expires_at, seq });
        self.order.push_back((key, seq));

        while self.entries.len() > self.capacity {
            let Some((old_key, old_seq)) = self.order.pop_front() else { break };
            if self.entries.get(&old_key).is_some_and(|e| e.seq == old_seq) {
                self.entries.remove(&old_key);
            }
        }

        if self.order.len() > self.capacity * 2 {
            self.compact();
        }
    }

    pub(super) fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key containing `pattern` (all keys when `None`).
    pub(super) fn clear(&mut self, pattern: Option<&str>) -> usize {
        let before = self.entries.len();
        match pattern {
            Some(p) => self.entries.retain(|k, _| !k.contains(p)),
            None => self.entries.clear(),
        }
        self.compact();
        before - self.entries.len()
    }

    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(super) fn capacity(&self) -> usize {
        self.capacity
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order
            .retain(|(k, seq)| entries.get(k).is_some_and(|e| e.seq == *seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn evicts_least_recently_inserted() {
        let mut tier = MemoryTier::new(2);
        tier.insert("a".into(), "1".into(), later());
        tier.insert("b".into(), "2".into(), later());
        // Reading `a` does not protect it.
        assert_eq!(tier.get("a").as_deref(), Some("1"));
        tier.insert("c".into(), "3".into(), later());
        assert_eq!(tier.get("a"), None);
        assert_eq!(tier.get("b").as_deref(), Some("2"));
        assert_eq!(tier.len(), 2);
    }

    #[test]
    fn overwrite_refreshes_insertion_order() {
        let mut tier = MemoryTier::new(2);
        tier.insert("a".into(), "1".into(), later());
        tier.insert("b".into(), "2".into(), later());
        tier.insert("a".into(), "1b".into(), later());
        tier.insert("c".into(), "3".into(), later());
        assert_eq!(tier.get("a").as_deref(), Some("1b"));
        assert_eq!(tier.get("b"), None);
    }

    #[test]
    fn repeated_overwrites_stay_bounded() {
        let mut tier = MemoryTier::new(4);
        for i in 0..100 {
            tier.insert("k".into(), i.to_string(), later());
        }
        assert_eq!(tier.len(), 1);
        assert!(tier.order.len() <= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_read_as_absent() {
        let mut tier = MemoryTier::new(4);
        tier.insert("k".into(), "v".into(), Instant::now() + Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(tier.get("k"), None);
        assert_eq!(tier.len(), 0);
    }

    #[test]
    fn clear_by_pattern() {
        let mut tier = MemoryTier::new(8);
        tier.insert("search:1".into(), "x".into(), later());
        tier.insert("search:2".into(), "x".into(), later());
        tier.insert("response:1".into(), "x".into(), later());
        assert_eq!(tier.clear(Some("search:")), 2);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.clear(None), 1);
    }
}
