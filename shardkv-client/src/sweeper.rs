//! # Cache Sweeper
//!
//! Background task that lazily evicts stale cache entries (§4.3 Cache
//! sweeper, P7). Paces itself so a full pass over the cache takes
//! approximately `leaseSeconds`, degenerating to a fixed `leaseSeconds`
//! tick when the cache is empty.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::state::ClientState;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Runs forever, sweeping one cache entry per pace tick. Intended to be
/// spawned as its own task for the lifetime of the client.
pub async fn run(state: Arc<Mutex<ClientState>>, lease_seconds: u32) {
    loop {
        let keys: Vec<String> = state.lock().records.keys().cloned().collect();
        if keys.is_empty() {
            tokio::time::sleep(Duration::from_secs(lease_seconds.max(1) as u64)).await;
            continue;
        }

        let pace = Duration::from_secs_f64(lease_seconds as f64 / keys.len() as f64);
        for key in keys {
            tokio::time::sleep(pace).await;
            sweep_one(&state, &key, now_unix());
        }
    }
}

fn sweep_one(state: &Arc<Mutex<ClientState>>, key: &str, now_unix: i64) {
    let mut guard = state.lock();
    let Some(record) = guard.records.get(key) else { return };
    let stale = !record.granted
        || record
            .last_query_unix()
            .map(|last| now_unix - last >= record.valid_seconds as i64)
            .unwrap_or(true);
    if stale {
        guard.values.remove(key);
        guard.records.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CacheRecord;

    #[test]
    fn sweep_one_drops_stale_entries() {
        let state = Arc::new(Mutex::new(ClientState::new()));
        {
            let mut guard = state.lock();
            guard.values.insert("k".to_string(), vec!["v".to_string()]);
            let mut record = CacheRecord::new();
            record.mark_granted(10, 0);
            record.note_query(0, 4);
            guard.records.insert("k".to_string(), record);
        }

        sweep_one(&state, "k", 100);
        let guard = state.lock();
        assert!(!guard.values.contains_key("k"));
        assert!(!guard.records.contains_key("k"));
    }

    #[test]
    fn sweep_one_keeps_fresh_entries() {
        let state = Arc::new(Mutex::new(ClientState::new()));
        {
            let mut guard = state.lock();
            guard.values.insert("k".to_string(), vec!["v".to_string()]);
            let mut record = CacheRecord::new();
            record.mark_granted(10, 0);
            record.note_query(0, 4);
            guard.records.insert("k".to_string(), record);
        }

        sweep_one(&state, "k", 1);
        let guard = state.lock();
        assert!(guard.values.contains_key("k"));
    }
}
