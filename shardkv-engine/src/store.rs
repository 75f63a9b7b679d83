//! # Sharded Value & Tenant Maps
//!
//! Purpose: hold the value cells (`key -> list[string]`) and the tenant
//! records (`key -> [{hostPort, grantedAtUnix}]`) a storage node owns,
//! sharded across lock stripes to keep unrelated keys from contending
//! (§5).
//!
//! Adapted from the reference engine's sharded `RwLock<ShardInner>` design
//! (`memory.rs`): same shard-count-as-power-of-two masking and per-shard
//! lock, generalized from a single byte-LRU cache to the list-valued cells
//! and tenant bookkeeping this store needs. There is no LRU or TTL-based
//! eviction here — every key lives until `Delete` removes it, since this
//! store has no capacity budget to enforce.

use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::RwLock;

use shardkv_common::types::{LeaseConfig, Tenant};

const DEFAULT_SHARD_MULTIPLIER: usize = 4;

struct ShardInner {
    values: HashMap<String, Vec<String>>,
    tenants: HashMap<String, Vec<Tenant>>,
}

impl ShardInner {
    fn new() -> Self {
        ShardInner {
            values: HashMap::new(),
            tenants: HashMap::new(),
        }
    }
}

struct Shard {
    inner: RwLock<ShardInner>,
}

/// Result of an `AppendToList`/`RemoveFromList` mutation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListOutcome {
    Applied,
    ItemExists,
    ItemNotFound,
}

/// Sharded storage for one node's disjoint arc of the ring.
pub struct Store {
    shards: Vec<Shard>,
    shard_mask: usize,
    hash_state: RandomState,
}

impl Store {
    pub fn new() -> Self {
        Self::with_shard_count(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                * DEFAULT_SHARD_MULTIPLIER,
        )
    }

    pub fn with_shard_count(shards: usize) -> Self {
        let shard_count = shards.max(1).next_power_of_two();
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(Shard {
                inner: RwLock::new(ShardInner::new()),
            });
        }
        Store {
            shards: shard_vec,
            shard_mask: shard_count - 1,
            hash_state: RandomState::new(),
        }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = self.hash_state.build_hasher();
        hasher.write(key.as_bytes());
        &self.shards[(hasher.finish() as usize) & self.shard_mask]
    }

    /// Returns a clone of the value list for `key`, if present.
    pub fn get(&self, key: &str) -> Option<Vec<String>> {
        let shard = self.shard_for(key);
        let inner = shard.inner.read();
        inner.values.get(key).cloned()
    }

    /// Unconditionally replaces the cell with the singleton `[value]`.
    pub fn put(&self, key: &str, value: String) {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        inner.values.insert(key.to_string(), vec![value]);
    }

    /// Removes the cell. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        inner.values.remove(key).is_some()
    }

    /// Inserts `value` into the sorted set at `key`, creating it if absent
    /// (I4: strictly sorted, duplicate-free).
    pub fn append_to_list(&self, key: &str, value: &str) -> ListOutcome {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        let list = inner.values.entry(key.to_string()).or_default();
        match list.binary_search_by(|existing| existing.as_str().cmp(value)) {
            Ok(_) => ListOutcome::ItemExists,
            Err(idx) => {
                list.insert(idx, value.to_string());
                ListOutcome::Applied
            }
        }
    }

    /// Removes `value` from the sorted set at `key`.
    pub fn remove_from_list(&self, key: &str, value: &str) -> ListOutcome {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        let Some(list) = inner.values.get_mut(key) else {
            return ListOutcome::ItemNotFound;
        };
        match list.binary_search_by(|existing| existing.as_str().cmp(value)) {
            Ok(idx) => {
                list.remove(idx);
                ListOutcome::Applied
            }
            Err(_) => ListOutcome::ItemNotFound,
        }
    }

    /// Records or refreshes a tenant's lease for `key`, upserting by
    /// `host_port` to keep the list sorted and duplicate-free (§4.2 step 2,
    /// §9 tenant list ordering).
    pub fn record_tenant(&self, key: &str, host_port: &str, granted_at_unix: i64) {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        let list = inner.tenants.entry(key.to_string()).or_default();
        match list.binary_search_by(|tenant| tenant.host_port.as_str().cmp(host_port)) {
            Ok(idx) => list[idx].granted_at_unix = granted_at_unix,
            Err(idx) => list.insert(
                idx,
                Tenant {
                    host_port: host_port.to_string(),
                    granted_at_unix,
                },
            ),
        }
    }

    /// Snapshots and clears every tenant recorded for `key`. The caller
    /// drives the revoke phase against the snapshot outside any store lock
    /// (§5: no lock is held across an outbound RPC).
    pub fn take_tenants(&self, key: &str) -> Vec<Tenant> {
        let shard = self.shard_for(key);
        let mut inner = shard.inner.write();
        inner.tenants.remove(key).unwrap_or_default()
    }

    /// True if `key`'s value cell currently exists. Used to decide whether
    /// a write transitions `Absent -> Present` (and therefore must revoke).
    pub fn contains(&self, key: &str) -> bool {
        let shard = self.shard_for(key);
        let inner = shard.inner.read();
        inner.values.contains_key(key)
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Drops tenants whose guarded deadline has already passed; kept separate
/// from `Store` so the revoke phase can filter a snapshot without holding
/// any shard lock.
pub fn live_tenants(tenants: Vec<Tenant>, config: &LeaseConfig, now_unix: i64) -> Vec<Tenant> {
    tenants
        .into_iter()
        .filter(|tenant| tenant.guarded_expiry_unix(config) > now_unix)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let store = Store::with_shard_count(4);
        store.put("k", "v".to_string());
        assert_eq!(store.get("k"), Some(vec!["v".to_string()]));
    }

    #[test]
    fn append_keeps_sorted_and_rejects_duplicates() {
        let store = Store::with_shard_count(4);
        assert_eq!(store.append_to_list("k", "b"), ListOutcome::Applied);
        assert_eq!(store.append_to_list("k", "a"), ListOutcome::Applied);
        assert_eq!(store.append_to_list("k", "c"), ListOutcome::Applied);
        assert_eq!(store.append_to_list("k", "b"), ListOutcome::ItemExists);
        assert_eq!(
            store.get("k"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn remove_from_absent_key_is_item_not_found() {
        let store = Store::with_shard_count(4);
        assert_eq!(store.remove_from_list("k", "x"), ListOutcome::ItemNotFound);
    }

    #[test]
    fn remove_from_list_then_idempotent() {
        let store = Store::with_shard_count(4);
        store.append_to_list("k", "a");
        assert_eq!(store.remove_from_list("k", "a"), ListOutcome::Applied);
        assert_eq!(store.remove_from_list("k", "a"), ListOutcome::ItemNotFound);
    }

    #[test]
    fn delete_absent_key_reports_false() {
        let store = Store::with_shard_count(4);
        assert!(!store.delete("k"));
        store.put("k", "v".to_string());
        assert!(store.delete("k"));
        assert!(!store.contains("k"));
    }

    #[test]
    fn tenant_upsert_keeps_sorted_by_host_port() {
        let store = Store::with_shard_count(4);
        store.record_tenant("k", "b:2", 10);
        store.record_tenant("k", "a:1", 20);
        store.record_tenant("k", "b:2", 30);
        let tenants = store.take_tenants("k");
        assert_eq!(tenants.len(), 2);
        assert_eq!(tenants[0].host_port, "a:1");
        assert_eq!(tenants[1].granted_at_unix, 30);
    }

    #[test]
    fn take_tenants_clears_the_list() {
        let store = Store::with_shard_count(4);
        store.record_tenant("k", "a:1", 10);
        assert_eq!(store.take_tenants("k").len(), 1);
        assert!(store.take_tenants("k").is_empty());
    }

    #[test]
    fn live_tenants_filters_expired_guard() {
        let config = LeaseConfig {
            lease_seconds: 10,
            guard_seconds: 2,
            ..Default::default()
        };
        let tenants = vec![
            Tenant { host_port: "a".into(), granted_at_unix: 0 },
            Tenant { host_port: "b".into(), granted_at_unix: 100 },
        ];
        let live = live_tenants(tenants, &config, 50);
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].host_port, "b");
    }
}
