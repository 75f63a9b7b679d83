//! # Client-Local Cache State
//!
//! Purpose: the cache, its records, and the revoke callback that mutates
//! both — all guarded by one lock, as §5 requires ("each client library
//! instance holds its own lock protecting cache, records, and connection
//! map, and never holds it across an outbound RPC").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use shardkv_common::error::Status;
use shardkv_common::wire::{Method, RevokeLeaseArgs, RevokeLeaseReply};
use shardkv_rpc::Handler;

use crate::record::CacheRecord;

/// Cached values and their lease bookkeeping. `values` and `records` are
/// always updated together so a value is never cached without a matching
/// record, and vice versa.
#[derive(Default)]
pub struct ClientState {
    pub values: HashMap<String, Vec<String>>,
    pub records: HashMap<String, CacheRecord>,
}

impl ClientState {
    pub fn new() -> Self {
        ClientState::default()
    }

    /// §4.3 Revoke callback: drops the cached value and marks the record
    /// revoked, if the key is cached at all.
    pub fn revoke(&mut self, key: &str) -> Status {
        if self.values.remove(key).is_some() {
            if let Some(record) = self.records.get_mut(key) {
                record.mark_revoked();
            }
            Status::Ok
        } else {
            Status::KeyNotFound
        }
    }
}

/// Answers `LeaseCallbacks.RevokeLease` on behalf of a [`ClientState`]
/// (§4.3). Registered as the handler for every connection the client
/// library's callback listener accepts.
pub struct RevokeHandler {
    state: Arc<Mutex<ClientState>>,
}

impl RevokeHandler {
    pub fn new(state: Arc<Mutex<ClientState>>) -> Self {
        RevokeHandler { state }
    }
}

#[async_trait]
impl Handler for RevokeHandler {
    async fn handle(&self, method: Method, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        if method != Method::RevokeLease {
            return Err(format!(
                "client callback listener does not answer {}",
                method.dotted_name()
            ));
        }
        let args: RevokeLeaseArgs = bincode::deserialize(&payload).map_err(|err| err.to_string())?;
        let status = self.state.lock().revoke(&args.key);
        bincode::serialize(&RevokeLeaseReply { status }).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoke_drops_cached_entry_and_marks_record() {
        let mut state = ClientState::new();
        state.values.insert("k".to_string(), vec!["v".to_string()]);
        let mut record = CacheRecord::new();
        record.mark_granted(10, 0);
        state.records.insert("k".to_string(), record);

        assert_eq!(state.revoke("k"), Status::Ok);
        assert!(!state.values.contains_key("k"));
        assert!(!state.records["k"].is_fresh(0));
    }

    #[test]
    fn revoke_on_uncached_key_is_key_not_found() {
        let mut state = ClientState::new();
        assert_eq!(state.revoke("missing"), Status::KeyNotFound);
    }
}
