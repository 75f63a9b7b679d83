//! # Cache Record
//!
//! Purpose: per-key bookkeeping that backs the cache coherence invariant
//! (I3) and the adaptive `Normal`-mode lease heuristic (§3, §4.3).

use std::collections::VecDeque;

use shardkv_common::types::LeaseConfig;

use crate::mode::LeaseMode;

/// Everything the client tracks about a key besides the cached value
/// itself: whether a lease is currently believed granted, when it was last
/// (re)acquired, and the recent read-time history the `Normal`-mode
/// heuristic is gated on.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    pub granted: bool,
    pub valid_seconds: u32,
    acquired_at_unix: i64,
    query_history: VecDeque<i64>,
}

impl CacheRecord {
    pub fn new() -> Self {
        CacheRecord {
            granted: false,
            valid_seconds: 0,
            acquired_at_unix: 0,
            query_history: VecDeque::new(),
        }
    }

    /// Appends a read timestamp, keeping only the most recent `cap`
    /// entries (§3: "bounded ring of last N unix-seconds of Get calls").
    pub fn note_query(&mut self, now_unix: i64, cap: usize) {
        self.query_history.push_back(now_unix);
        while self.query_history.len() > cap.max(1) {
            self.query_history.pop_front();
        }
    }

    /// I3: a cached value is readable only while `granted` and the lease
    /// was acquired within the last `valid_seconds`.
    pub fn is_fresh(&self, now_unix: i64) -> bool {
        self.granted && now_unix - self.acquired_at_unix < self.valid_seconds as i64
    }

    /// Records that a lease was just granted by the owning node.
    pub fn mark_granted(&mut self, valid_seconds: u32, now_unix: i64) {
        self.granted = true;
        self.valid_seconds = valid_seconds;
        self.acquired_at_unix = now_unix;
    }

    /// Revoke callback or sweeper expiry: the entry is no longer servable
    /// from cache (I3).
    pub fn mark_revoked(&mut self) {
        self.granted = false;
    }

    /// Most recent read time recorded for this key, used by the cache
    /// sweeper (§4.3 Cache sweeper) as the staleness clock.
    pub fn last_query_unix(&self) -> Option<i64> {
        self.query_history.back().copied()
    }

    /// §4.3 step 3: whether this read should ask the owning node for a
    /// lease, given the configured mode.
    pub fn wants_lease(&self, mode: LeaseMode, config: &LeaseConfig, now_unix: i64) -> bool {
        match mode {
            LeaseMode::Never => false,
            LeaseMode::Always => true,
            LeaseMode::Normal => {
                self.query_history.len() >= config.query_cache_thresh
                    && self
                        .query_history
                        .front()
                        .is_some_and(|&oldest| now_unix - oldest <= config.query_cache_seconds)
            }
        }
    }
}

impl Default for CacheRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LeaseConfig {
        LeaseConfig {
            lease_seconds: 10,
            guard_seconds: 2,
            query_cache_thresh: 3,
            query_cache_seconds: 10,
        }
    }

    #[test]
    fn fresh_only_while_granted_and_within_valid_seconds() {
        let mut record = CacheRecord::new();
        assert!(!record.is_fresh(100));
        record.mark_granted(10, 100);
        assert!(record.is_fresh(105));
        assert!(!record.is_fresh(111));
        record.mark_revoked();
        assert!(!record.is_fresh(105));
    }

    #[test]
    fn normal_mode_requires_threshold_within_window() {
        let config = config();
        let mut record = CacheRecord::new();
        record.note_query(0, config.query_cache_thresh);
        record.note_query(1, config.query_cache_thresh);
        assert!(!record.wants_lease(LeaseMode::Normal, &config, 1));

        record.note_query(2, config.query_cache_thresh);
        assert!(record.wants_lease(LeaseMode::Normal, &config, 2));
    }

    #[test]
    fn normal_mode_ignores_stale_history_outside_window() {
        let config = config();
        let mut record = CacheRecord::new();
        record.note_query(0, config.query_cache_thresh);
        record.note_query(1, config.query_cache_thresh);
        record.note_query(2, config.query_cache_thresh);
        assert!(!record.wants_lease(LeaseMode::Normal, &config, 20));
    }

    #[test]
    fn history_is_capped_to_threshold() {
        let mut record = CacheRecord::new();
        for t in 0..10 {
            record.note_query(t, 3);
        }
        assert_eq!(record.query_history.len(), 3);
    }

    #[test]
    fn never_and_always_ignore_history() {
        let config = config();
        let record = CacheRecord::new();
        assert!(!record.wants_lease(LeaseMode::Never, &config, 0));
        assert!(record.wants_lease(LeaseMode::Always, &config, 0));
    }
}
