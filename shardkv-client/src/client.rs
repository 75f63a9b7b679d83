//! # Client Library Facade
//!
//! Purpose: the per-application-server entry point (§4.3): routes reads
//! and writes by consistent hash, decides when to ask for a lease, serves
//! revoke callbacks, and runs the cache sweeper — all behind a small
//! blocking-free API.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides routing, pooling, and caching
//!    behind six verbs, mirroring the reference sync client's
//!    `KVClient` shape.
//! 2. **One Lock For Cache State**: cache, records, are a single
//!    `parking_lot::Mutex<ClientState>`, never held across an outbound RPC
//!    (§5).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tokio::net::TcpListener;

use shardkv_common::error::{HkvError, HkvResult};
use shardkv_common::ring::Ring;
use shardkv_common::types::{Lease, LeaseConfig, NodeDescriptor};
use shardkv_common::wire::{
    DeleteArgs, DeleteReply, GetArgs, GetListReply, GetReply, GetServersArgs, GetServersReply,
    ListItemArgs, ListItemReply, Method, PutArgs, PutReply,
};
use shardkv_rpc::{NullHandler, PeerPool, RpcConnection, RpcError};

use crate::mode::LeaseMode;
use crate::record::CacheRecord;
use crate::state::{ClientState, RevokeHandler};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const DISCOVER_RETRY_BASE: Duration = Duration::from_millis(200);
const DISCOVER_RETRY_STEP: Duration = Duration::from_millis(200);
const DISCOVER_RETRY_MAX: Duration = Duration::from_secs(5);

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Polls `addr` with `GetServers` until the cluster reports ready,
/// returning the full node list (§4.2 `GetServers`: "the idempotent read
/// of this state for later-arriving clients").
pub async fn discover_cluster(addr: &str) -> HkvResult<Vec<NodeDescriptor>> {
    let conn = RpcConnection::connect(addr, Arc::new(NullHandler)).await?;
    let mut attempt: u32 = 0;
    loop {
        let payload = bincode::serialize(&GetServersArgs)?;
        let response = conn.call(Method::GetServers, payload, CALL_TIMEOUT).await?;
        let reply: GetServersReply = bincode::deserialize(&response)?;
        if let Some(err) = reply.status.into_error() {
            if !matches!(err, HkvError::NotReady) {
                return Err(err);
            }
            attempt += 1;
            let backoff = (DISCOVER_RETRY_BASE + DISCOVER_RETRY_STEP * attempt).min(DISCOVER_RETRY_MAX);
            tokio::time::sleep(backoff).await;
            continue;
        }
        return Ok(reply.servers);
    }
}

/// Routes requests across the ring, caches leased reads, and answers
/// revoke callbacks for one application server.
pub struct KVClient {
    ring: Ring,
    node_pool: PeerPool,
    state: Arc<Mutex<ClientState>>,
    mode: LeaseMode,
    config: LeaseConfig,
    host_port: String,
}

impl KVClient {
    /// `servers` is the closed ring (from [`discover_cluster`] or a known
    /// node list). `listen_addr` is where this client's own callback
    /// listener binds; ignored when `mode` is [`LeaseMode::Never`].
    pub async fn connect(
        servers: Vec<NodeDescriptor>,
        listen_addr: &str,
        mode: LeaseMode,
        config: LeaseConfig,
    ) -> HkvResult<Self> {
        let mut ring = Ring::new();
        for server in &servers {
            ring.insert(server.node_id, server.host_port.clone());
        }

        let state = Arc::new(Mutex::new(ClientState::new()));

        let host_port = if mode.registers_callback_listener() {
            let listener = TcpListener::bind(listen_addr).await?;
            let bound_addr = listener.local_addr()?.to_string();
            let handler: Arc<dyn shardkv_rpc::Handler> =
                Arc::new(RevokeHandler::new(state.clone()));
            tokio::spawn(async move {
                if let Err(err) = shardkv_rpc::serve(listener, handler).await {
                    tracing::error!(error = %err, "client callback listener stopped");
                }
            });
            bound_addr
        } else {
            listen_addr.to_string()
        };

        let sweeper_state = state.clone();
        let lease_seconds = config.lease_seconds;
        tokio::spawn(async move {
            crate::sweeper::run(sweeper_state, lease_seconds).await;
        });

        Ok(KVClient {
            ring,
            node_pool: PeerPool::new(Arc::new(NullHandler)),
            state,
            mode,
            config,
            host_port,
        })
    }

    /// Issues `method(payload)` on `conn` and, on a transport-class failure
    /// (as opposed to an application-level rejection on an otherwise-live
    /// connection), evicts `addr` from the pool so the next request redials
    /// instead of reusing the dead connection.
    async fn call(&self, addr: &str, conn: &RpcConnection, method: Method, payload: Vec<u8>) -> HkvResult<Vec<u8>> {
        match conn.call(method, payload, CALL_TIMEOUT).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                if matches!(err, RpcError::Io(_) | RpcError::Closed | RpcError::TimedOut) {
                    self.node_pool.evict(addr).await;
                }
                Err(HkvError::from(err))
            }
        }
    }

    fn owner_addr(&self, key: &str) -> HkvResult<String> {
        let node_id = self.ring.locate(key).ok_or(HkvError::NotReady)?;
        self.ring
            .host_port(node_id)
            .map(str::to_string)
            .ok_or_else(|| HkvError::Internal("ring has no address for located node".to_string()))
    }

    /// §4.3 Read path steps 1-2: a fast path that never leaves the lock
    /// held across an RPC.
    fn try_cached(&self, key: &str) -> Option<Vec<String>> {
        let now = now_unix();
        let mut guard = self.state.lock();
        let fresh = guard.records.get(key).map(|record| record.is_fresh(now)).unwrap_or(false);
        if !fresh {
            return None;
        }
        let values = guard.values.get(key).cloned();
        if values.is_some() {
            if let Some(record) = guard.records.get_mut(key) {
                record.note_query(now, self.config.query_cache_thresh);
            }
        }
        values
    }

    /// §4.3 Read path step 3: per-mode decision on whether to ask for a
    /// lease on this read.
    fn decide_want_lease(&self, key: &str, now: i64) -> bool {
        let guard = self.state.lock();
        match guard.records.get(key) {
            Some(record) => record.wants_lease(self.mode, &self.config, now),
            None => matches!(self.mode, LeaseMode::Always),
        }
    }

    /// §4.3 Read path step 5: record the query and, if a lease was granted,
    /// populate the cache.
    fn apply_read_success(
        &self,
        key: &str,
        now: i64,
        want_lease: bool,
        lease: Option<Lease>,
        values: Vec<String>,
    ) {
        let mut guard = self.state.lock();
        let record = guard.records.entry(key.to_string()).or_insert_with(CacheRecord::new);
        record.note_query(now, self.config.query_cache_thresh);
        if want_lease {
            if let Some(lease) = lease {
                if lease.granted {
                    record.mark_granted(lease.valid_seconds, now);
                    guard.values.insert(key.to_string(), values);
                }
            }
        }
    }

    /// Fetches the single-value view of `key`.
    pub async fn get(&self, key: &str) -> HkvResult<String> {
        if let Some(cached) = self.try_cached(key) {
            return Ok(cached.into_iter().next().unwrap_or_default());
        }

        let now = now_unix();
        let want_lease = self.decide_want_lease(key, now);
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;

        let args = GetArgs { key: key.to_string(), want_lease, host_port: self.host_port.clone() };
        let payload = bincode::serialize(&args)?;
        let response = self.call(&addr, &conn, Method::Get, payload).await?;
        let reply: GetReply = bincode::deserialize(&response)?;
        if let Some(err) = reply.status.into_error() {
            return Err(err);
        }

        self.apply_read_success(key, now, want_lease, reply.lease, vec![reply.value.clone()]);
        Ok(reply.value)
    }

    /// Fetches the sorted-set view of `key`.
    pub async fn get_list(&self, key: &str) -> HkvResult<Vec<String>> {
        if let Some(cached) = self.try_cached(key) {
            return Ok(cached);
        }

        let now = now_unix();
        let want_lease = self.decide_want_lease(key, now);
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;

        let args = GetArgs { key: key.to_string(), want_lease, host_port: self.host_port.clone() };
        let payload = bincode::serialize(&args)?;
        let response = self.call(&addr, &conn, Method::GetList, payload).await?;
        let reply: GetListReply = bincode::deserialize(&response)?;
        if let Some(err) = reply.status.into_error() {
            return Err(err);
        }

        self.apply_read_success(key, now, want_lease, reply.lease, reply.values.clone());
        Ok(reply.values)
    }

    /// Unconditionally replaces `key`'s cell with the singleton `[value]`.
    pub async fn put(&self, key: &str, value: &str) -> HkvResult<()> {
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;
        let payload = bincode::serialize(&PutArgs { key: key.to_string(), value: value.to_string() })?;
        let response = self.call(&addr, &conn, Method::Put, payload).await?;
        let reply: PutReply = bincode::deserialize(&response)?;
        match reply.status.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Removes `key`'s cell entirely.
    pub async fn delete(&self, key: &str) -> HkvResult<()> {
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;
        let payload = bincode::serialize(&DeleteArgs { key: key.to_string() })?;
        let response = self.call(&addr, &conn, Method::Delete, payload).await?;
        let reply: DeleteReply = bincode::deserialize(&response)?;
        match reply.status.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Inserts `value` into the sorted set at `key`.
    pub async fn append_to_list(&self, key: &str, value: &str) -> HkvResult<()> {
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;
        let payload = bincode::serialize(&ListItemArgs { key: key.to_string(), value: value.to_string() })?;
        let response = self.call(&addr, &conn, Method::AppendToList, payload).await?;
        let reply: ListItemReply = bincode::deserialize(&response)?;
        match reply.status.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Removes `value` from the sorted set at `key`.
    pub async fn remove_from_list(&self, key: &str, value: &str) -> HkvResult<()> {
        let addr = self.owner_addr(key)?;
        let conn = self.node_pool.get(&addr).await?;
        let payload = bincode::serialize(&ListItemArgs { key: key.to_string(), value: value.to_string() })?;
        let response = self.call(&addr, &conn, Method::RemoveFromList, payload).await?;
        let reply: ListItemReply = bincode::deserialize(&response)?;
        match reply.status.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
