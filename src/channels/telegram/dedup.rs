//! Telegram update deduplication cache

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default dedup TTL (5 minutes)
const DEDUP_TTL_SECS: u64 = 300;

/// Maximum dedup cache entries
const DEDUP_MAX_ENTRIES: usize = 2000;

/// Telegram update deduplication cache
///
/// A getUpdates response can repeat an update when the previous offset
/// acknowledgement was lost, so each update id is remembered for a while.
/// Expired entries are evicted when the cache is full.
#[derive(Debug)]
pub struct UpdateDedup {
    cache: HashMap<i64, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl Default for UpdateDedup {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEDUP_TTL_SECS), DEDUP_MAX_ENTRIES)
    }
}

impl UpdateDedup {
    /// Create a cache with a custom TTL and capacity
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            cache: HashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Check if `update_id` has been seen recently
    ///
    /// Returns `true` for a duplicate. Returns `false` on first sight and
    /// records the id.
    pub fn is_duplicate(&mut self, update_id: i64) -> bool {
        let now = Instant::now();

        if let Some(ts) = self.cache.get(&update_id)
            && now.duration_since(*ts) < self.ttl
        {
            return true;
        }

        if self.cache.len() >= self.max_entries {
            self.cache.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }

        // Still full: drop the oldest
        if self.cache.len() >= self.max_entries
            && let Some(oldest) = self
                .cache
                .iter()
                .min_by_key(|(_, ts)| **ts)
                .map(|(id, _)| *id)
        {
            self.cache.remove(&oldest);
        }

        self.cache.insert(update_id, now);
        false
    }

    /// Number of remembered updates
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing has been remembered yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sight_is_duplicate() {
        let mut dedup = UpdateDedup::default();
        assert!(!dedup.is_duplicate(10));
        assert!(dedup.is_duplicate(10));
        assert!(!dedup.is_duplicate(11));
    }

    #[test]
    fn capacity_is_bounded() {
        let mut dedup = UpdateDedup::new(Duration::from_secs(60), 3);
        for id in 0..10 {
            assert!(!dedup.is_duplicate(id));
        }
        assert_eq!(dedup.len(), 3);
        assert!(dedup.is_duplicate(9));
    }

    #[test]
    fn expired_ids_are_fresh_again() {
        let mut dedup = UpdateDedup::new(Duration::ZERO, 10);
        assert!(!dedup.is_duplicate(1));
        assert!(!dedup.is_duplicate(1));
    }
}
