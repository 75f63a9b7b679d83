//! # Peer Connection Cache
//!
//! Purpose: reuse one multiplexed [`RpcConnection`] per peer address instead
//! of dialing fresh for every call. Used by the storage node to reach a
//! tenant's callback listener and by the client library to reach storage
//! nodes (§4.2, §4.3).
//!
//! Adapted from the reference client's connection pool (`pool.rs`): same
//! object-pool spirit — reuse what's live, fail fast rather than block
//! forever — but keyed by address with exactly one live connection per key,
//! since a multiplexed connection has no notion of "checkout" and "return".

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::connection::RpcConnection;
use crate::error::RpcError;
use crate::handler::Handler;

/// Caches one [`RpcConnection`] per `host_port`. Connections are dialed
/// lazily and re-dialed transparently if the previous one died.
pub struct PeerPool {
    handler: Arc<dyn Handler>,
    slots: DashMap<String, Arc<AsyncMutex<Option<RpcConnection>>>>,
}

impl PeerPool {
    /// `handler` answers whatever every pooled connection's peer calls back
    /// on it (e.g. a client's `RevokeLease` handler reused across every
    /// storage node connection).
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        PeerPool {
            handler,
            slots: DashMap::new(),
        }
    }

    /// Returns the live connection to `addr`, dialing one if none exists or
    /// the cached one's reader task has observed the peer hang up.
    pub async fn get(&self, addr: &str) -> Result<RpcConnection, RpcError> {
        let slot = self
            .slots
            .entry(addr.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(None)))
            .clone();

        let mut guard = slot.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.is_closed() {
                return Ok(conn.clone());
            }
        }

        let conn = RpcConnection::connect(addr, self.handler.clone()).await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drops the cached connection to `addr`, forcing the next `get` to
    /// redial. Call this after a call fails so a dead connection doesn't
    /// poison every subsequent request.
    pub async fn evict(&self, addr: &str) {
        if let Some(slot) = self.slots.get(addr) {
            let mut guard = slot.lock().await;
            *guard = None;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use shardkv_common::wire::Method;

    struct Echo;
    #[async_trait]
    impl Handler for Echo {
        async fn handle(&self, _method: Method, payload: Vec<u8>) -> Result<Vec<u8>, String> {
            Ok(payload)
        }
    }

    #[tokio::test]
    async fn dials_once_and_reuses() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                if let Ok((stream, _)) = listener.accept().await {
                    crate::connection::RpcConnection::from_stream(stream, Arc::new(Echo));
                }
            }
        });

        let pool = PeerPool::new(Arc::new(Echo));
        let a = pool.get(&addr.to_string()).await.unwrap();
        let b = pool.get(&addr.to_string()).await.unwrap();
        assert_eq!(pool.len(), 1);
        drop(a);
        drop(b);
    }
}
