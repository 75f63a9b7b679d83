//! # Wire Records
//!
//! The request/reply payloads carried inside an RPC envelope (§4.4, §6).
//! These are plain `serde` records; `shardkv-rpc` is what frames and
//! multiplexes them.

use serde::{Deserialize, Serialize};

use crate::error::Status;
use crate::types::{Lease, NodeDescriptor};

/// The closed set of methods a storage node or client callback endpoint
/// answers. A dotted name in the design prose, a plain enum on the wire —
/// the method set is known at compile time, so there is no value in
/// encoding it as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    RegisterServer,
    GetServers,
    Get,
    GetList,
    Put,
    Delete,
    AppendToList,
    RemoveFromList,
    RevokeLease,
}

impl Method {
    /// The dotted name used in logs, matching §6's RPC surface tables.
    pub fn dotted_name(self) -> &'static str {
        match self {
            Method::RegisterServer => "StorageServer.RegisterServer",
            Method::GetServers => "StorageServer.GetServers",
            Method::Get => "StorageServer.Get",
            Method::GetList => "StorageServer.GetList",
            Method::Put => "StorageServer.Put",
            Method::Delete => "StorageServer.Delete",
            Method::AppendToList => "StorageServer.AppendToList",
            Method::RemoveFromList => "StorageServer.RemoveFromList",
            Method::RevokeLease => "LeaseCallbacks.RevokeLease",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServerArgs {
    pub node: NodeDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterServerReply {
    pub status: Status,
    pub servers: Vec<NodeDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServersArgs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServersReply {
    pub status: Status,
    pub servers: Vec<NodeDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArgs {
    pub key: String,
    pub want_lease: bool,
    pub host_port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetReply {
    pub status: Status,
    pub value: String,
    pub lease: Option<Lease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetListReply {
    pub status: Status,
    pub values: Vec<String>,
    pub lease: Option<Lease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutReply {
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArgs {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReply {
    pub status: Status,
}

/// Shared by `AppendToList` and `RemoveFromList` (§6), mirroring the
/// reference behavior's single `PutArgs`-shaped request for both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListItemReply {
    pub status: Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeLeaseArgs {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeLeaseReply {
    pub status: Status,
}
