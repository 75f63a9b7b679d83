//! # Cluster Bootstrap
//!
//! Purpose: drive a slave node's join sequence against the master (§4.2
//! Bootstrap, scenario 6). The master side lives in
//! [`crate::node::StorageNode::handle`] (`RegisterServer`/`GetServers`)
//! since it is answered over the same RPC surface everything else uses;
//! this module is only the *caller* half, run once at process startup.

use std::sync::Arc;
use std::time::Duration;

use shardkv_common::wire::{Method, RegisterServerArgs, RegisterServerReply};
use shardkv_common::error::{HkvError, HkvResult, Status};
use shardkv_rpc::{NullHandler, RpcConnection};

use crate::node::StorageNode;

const RETRY_BASE: Duration = Duration::from_millis(200);
const RETRY_STEP: Duration = Duration::from_millis(200);
const RETRY_MAX: Duration = Duration::from_secs(5);
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Registers with `master_addr`, retrying with linear backoff on
/// `NotReady`, and installs the ring once the master answers `OK`.
pub async fn join_cluster(node: &Arc<StorageNode>, master_addr: &str) -> HkvResult<()> {
    let conn = RpcConnection::connect(master_addr, Arc::new(NullHandler))
        .await
        .map_err(|err| HkvError::Transport(err.to_string()))?;

    let mut attempt: u32 = 0;
    loop {
        let payload = bincode::serialize(&RegisterServerArgs { node: node.descriptor.clone() })?;
        let response = conn
            .call(Method::RegisterServer, payload, CALL_TIMEOUT)
            .await
            .map_err(|err| HkvError::Transport(err.to_string()))?;
        let reply: RegisterServerReply = bincode::deserialize(&response)?;

        match reply.status {
            Status::Ok => {
                tracing::info!(
                    node_id = node.descriptor.node_id,
                    servers = reply.servers.len(),
                    "cluster ready, installing ring"
                );
                node.install_ring(&reply.servers);
                return Ok(());
            }
            Status::NotReady => {
                attempt += 1;
                let backoff = (RETRY_BASE + RETRY_STEP * attempt).min(RETRY_MAX);
                tracing::debug!(attempt, ?backoff, "master not ready, retrying registration");
                tokio::time::sleep(backoff).await;
            }
            other => {
                return Err(HkvError::Internal(format!(
                    "unexpected RegisterServer status {other}"
                )));
            }
        }
    }
}
