//! # Storage Node
//!
//! Wires the sharded store (`store.rs`), the per-key lock registry
//! (`keylock.rs`), and bootstrap/ring state together into one type that
//! implements [`shardkv_rpc::Handler`] for the `StorageServer.*` surface
//! (§4.2, §6).

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use shardkv_common::error::Status;
use shardkv_common::ring::Ring;
use shardkv_common::types::{Lease, LeaseConfig, NodeDescriptor};
use shardkv_common::wire::{
    DeleteArgs, DeleteReply, GetArgs, GetListReply, GetReply, GetServersReply, ListItemArgs,
    ListItemReply, PutArgs, PutReply, RegisterServerArgs, RegisterServerReply, RevokeLeaseArgs,
};
use shardkv_rpc::{Handler, NullHandler, PeerPool, RpcError};

use crate::keylock::KeyLockRegistry;
use crate::store::{live_tenants, ListOutcome, Store};

/// Bootstrap progresses from collecting registrants to a closed ring; see
/// §4.2. Only the master instance ever grows `Forming`; a slave transitions
/// straight to `Ready` once `bootstrap::join_cluster` installs the ring it
/// was handed.
enum BootstrapState {
    Forming { registrants: Vec<NodeDescriptor> },
    Ready(Ring),
}

/// A storage node: owns one arc of the ring, the values and tenants in it,
/// and the machinery to revoke leases before mutating.
pub struct StorageNode {
    pub descriptor: NodeDescriptor,
    config: LeaseConfig,
    cluster_size: u32,
    store: Store,
    keylocks: KeyLockRegistry,
    bootstrap: RwLock<BootstrapState>,
    peers: PeerPool,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

impl StorageNode {
    /// Builds a master node: the ring starts seeded with just this node and
    /// grows as slaves register (§4.2 Bootstrap).
    pub fn new_master(descriptor: NodeDescriptor, cluster_size: u32, config: LeaseConfig) -> Arc<Self> {
        let mut ring = Ring::new();
        ring.insert(descriptor.node_id, descriptor.host_port.clone());
        let state = if cluster_size <= 1 {
            BootstrapState::Ready(ring)
        } else {
            BootstrapState::Forming {
                registrants: vec![descriptor.clone()],
            }
        };
        Arc::new(StorageNode {
            descriptor,
            config,
            cluster_size,
            store: Store::new(),
            keylocks: KeyLockRegistry::new(),
            bootstrap: RwLock::new(state),
            peers: PeerPool::new(Arc::new(NullHandler)),
        })
    }

    /// Builds a slave node: bootstrap (`bootstrap::join_cluster`) installs
    /// the ring once the master answers `OK`.
    pub fn new_slave(descriptor: NodeDescriptor, cluster_size: u32, config: LeaseConfig) -> Arc<Self> {
        Arc::new(StorageNode {
            descriptor,
            config,
            cluster_size,
            store: Store::new(),
            keylocks: KeyLockRegistry::new(),
            bootstrap: RwLock::new(BootstrapState::Forming {
                registrants: Vec::new(),
            }),
            peers: PeerPool::new(Arc::new(NullHandler)),
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.bootstrap.read(), BootstrapState::Ready(_))
    }

    /// Installs an externally-resolved ring (the slave path: the master
    /// answered `OK` with the full node list).
    pub fn install_ring(&self, nodes: &[NodeDescriptor]) {
        let mut ring = Ring::new();
        for node in nodes {
            ring.insert(node.node_id, node.host_port.clone());
        }
        *self.bootstrap.write() = BootstrapState::Ready(ring);
    }

    /// The master-side half of `RegisterServer`: records the registrant and
    /// closes the ring once `cluster_size` has been reached.
    fn handle_register_server(&self, node: NodeDescriptor) -> RegisterServerReply {
        let mut state = self.bootstrap.write();
        match &mut *state {
            BootstrapState::Ready(ring) => RegisterServerReply {
                status: Status::Ok,
                servers: ring.descriptors(),
            },
            BootstrapState::Forming { registrants } => {
                if !registrants.iter().any(|n| n.node_id == node.node_id) {
                    registrants.push(node);
                }
                if registrants.len() as u32 >= self.cluster_size {
                    let mut ring = Ring::new();
                    for registrant in registrants.iter() {
                        ring.insert(registrant.node_id, registrant.host_port.clone());
                    }
                    let servers = ring.descriptors();
                    *state = BootstrapState::Ready(ring);
                    RegisterServerReply {
                        status: Status::Ok,
                        servers,
                    }
                } else {
                    RegisterServerReply {
                        status: Status::NotReady,
                        servers: Vec::new(),
                    }
                }
            }
        }
    }

    fn handle_get_servers(&self) -> GetServersReply {
        match &*self.bootstrap.read() {
            BootstrapState::Ready(ring) => GetServersReply {
                status: Status::Ok,
                servers: ring.descriptors(),
            },
            BootstrapState::Forming { .. } => GetServersReply {
                status: Status::NotReady,
                servers: Vec::new(),
            },
        }
    }

    /// `WrongServer` unless this node is the ring-successor of `key`
    /// (§4.2 Routing check, P6).
    fn owns(&self, key: &str) -> Result<(), Status> {
        match &*self.bootstrap.read() {
            BootstrapState::Forming { .. } => Err(Status::NotReady),
            BootstrapState::Ready(ring) => match ring.locate(key) {
                Some(owner) if owner == self.descriptor.node_id => Ok(()),
                _ => Err(Status::WrongServer),
            },
        }
    }

    fn handle_get(&self, args: GetArgs) -> GetReply {
        if let Err(status) = self.owns(&args.key) {
            return GetReply { status, value: String::new(), lease: None };
        }
        match self.store.get(&args.key) {
            None => GetReply { status: Status::KeyNotFound, value: String::new(), lease: None },
            Some(values) => {
                let value = values.into_iter().next().unwrap_or_default();
                let lease = self.maybe_grant_lease(&args.key, args.want_lease, &args.host_port);
                GetReply { status: Status::Ok, value, lease }
            }
        }
    }

    fn handle_get_list(&self, args: GetArgs) -> GetListReply {
        if let Err(status) = self.owns(&args.key) {
            return GetListReply { status, values: Vec::new(), lease: None };
        }
        match self.store.get(&args.key) {
            None => GetListReply { status: Status::KeyNotFound, values: Vec::new(), lease: None },
            Some(values) => {
                let lease = self.maybe_grant_lease(&args.key, args.want_lease, &args.host_port);
                GetListReply { status: Status::Ok, values, lease }
            }
        }
    }

    /// §4.2 Read operations steps 1-3: record the tenant synchronously and
    /// hand back a granted lease, or grant nothing if the caller didn't ask.
    fn maybe_grant_lease(&self, key: &str, want_lease: bool, host_port: &str) -> Option<Lease> {
        if !want_lease {
            return None;
        }
        self.store.record_tenant(key, host_port, now_unix());
        Some(Lease { granted: true, valid_seconds: self.config.lease_seconds })
    }

    async fn handle_put(&self, args: PutArgs) -> PutReply {
        if let Err(status) = self.owns(&args.key) {
            return PutReply { status };
        }
        let _guard = self.keylocks.lock(&args.key).await;
        self.revoke_tenants(&args.key).await;
        self.store.put(&args.key, args.value);
        self.keylocks.prune(&args.key);
        PutReply { status: Status::Ok }
    }

    async fn handle_delete(&self, args: DeleteArgs) -> DeleteReply {
        if let Err(status) = self.owns(&args.key) {
            return DeleteReply { status };
        }
        let _guard = self.keylocks.lock(&args.key).await;
        if !self.store.contains(&args.key) {
            self.keylocks.prune(&args.key);
            return DeleteReply { status: Status::KeyNotFound };
        }
        self.revoke_tenants(&args.key).await;
        self.store.delete(&args.key);
        self.keylocks.prune(&args.key);
        DeleteReply { status: Status::Ok }
    }

    async fn handle_append(&self, args: ListItemArgs) -> ListItemReply {
        if let Err(status) = self.owns(&args.key) {
            return ListItemReply { status };
        }
        let _guard = self.keylocks.lock(&args.key).await;
        self.revoke_tenants(&args.key).await;
        let status = match self.store.append_to_list(&args.key, &args.value) {
            ListOutcome::Applied => Status::Ok,
            ListOutcome::ItemExists => Status::ItemExists,
            ListOutcome::ItemNotFound => unreachable!("append never reports ItemNotFound"),
        };
        self.keylocks.prune(&args.key);
        ListItemReply { status }
    }

    async fn handle_remove(&self, args: ListItemArgs) -> ListItemReply {
        if let Err(status) = self.owns(&args.key) {
            return ListItemReply { status };
        }
        let _guard = self.keylocks.lock(&args.key).await;
        self.revoke_tenants(&args.key).await;
        let status = match self.store.remove_from_list(&args.key, &args.value) {
            ListOutcome::Applied => Status::Ok,
            ListOutcome::ItemNotFound => Status::ItemNotFound,
            ListOutcome::ItemExists => unreachable!("remove never reports ItemExists"),
        };
        self.keylocks.prune(&args.key);
        ListItemReply { status }
    }

    /// §4.2 Revoke phase: snapshot this key's tenants, call each back with
    /// a deadline equal to its remaining guarded lifetime, and absorb any
    /// failure or timeout (§4.2 Failure semantics, §9 lock-hazard fix).
    /// Called while holding this key's async mutex, never a store lock.
    async fn revoke_tenants(&self, key: &str) {
        let tenants = live_tenants(self.store.take_tenants(key), &self.config, now_unix());
        if tenants.is_empty() {
            return;
        }
        for tenant in tenants {
            let deadline = tenant.guarded_expiry_unix(&self.config) - now_unix();
            let timeout = Duration::from_secs(deadline.max(0) as u64);
            if let Err(err) = self.call_revoke(&tenant.host_port, key, timeout).await {
                if matches!(err, RpcError::Io(_) | RpcError::Closed | RpcError::TimedOut) {
                    self.peers.evict(&tenant.host_port).await;
                }
                tracing::warn!(
                    key,
                    tenant = tenant.host_port.as_str(),
                    error = %err,
                    "revoke callback failed; absorbed by guard"
                );
            }
        }
    }

    /// Bounds the *entire* call — dial included — by `timeout`, so a
    /// black-holed tenant's unbounded `connect()` can't stall the revoke
    /// phase past its guarded deadline (§4.2 Failure semantics).
    async fn call_revoke(&self, host_port: &str, key: &str, timeout: Duration) -> Result<(), RpcError> {
        tokio::time::timeout(timeout, self.call_revoke_inner(host_port, key, timeout))
            .await
            .unwrap_or(Err(RpcError::TimedOut))
    }

    async fn call_revoke_inner(&self, host_port: &str, key: &str, timeout: Duration) -> Result<(), RpcError> {
        let conn = self.peers.get(host_port).await?;
        let payload = bincode::serialize(&RevokeLeaseArgs { key: key.to_string() })
            .map_err(RpcError::Encoding)?;
        conn.call(shardkv_common::wire::Method::RevokeLease, payload, timeout)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for StorageNode {
    async fn handle(
        &self,
        method: shardkv_common::wire::Method,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, String> {
        use shardkv_common::wire::Method;

        macro_rules! decode {
            ($ty:ty) => {
                bincode::deserialize::<$ty>(&payload).map_err(|err| err.to_string())?
            };
        }
        macro_rules! encode {
            ($reply:expr) => {
                bincode::serialize(&$reply).map_err(|err| err.to_string())
            };
        }

        match method {
            Method::RegisterServer => {
                let args = decode!(RegisterServerArgs);
                encode!(self.handle_register_server(args.node))
            }
            Method::GetServers => encode!(self.handle_get_servers()),
            Method::Get => {
                let args = decode!(GetArgs);
                encode!(self.handle_get(args))
            }
            Method::GetList => {
                let args = decode!(GetArgs);
                encode!(self.handle_get_list(args))
            }
            Method::Put => {
                let args = decode!(PutArgs);
                encode!(self.handle_put(args).await)
            }
            Method::Delete => {
                let args = decode!(DeleteArgs);
                encode!(self.handle_delete(args).await)
            }
            Method::AppendToList => {
                let args = decode!(ListItemArgs);
                encode!(self.handle_append(args).await)
            }
            Method::RemoveFromList => {
                let args = decode!(ListItemArgs);
                encode!(self.handle_remove(args).await)
            }
            Method::RevokeLease => Err(format!(
                "{} is a client-side method, not answered by a storage node",
                method.dotted_name()
            )),
        }
    }
}
