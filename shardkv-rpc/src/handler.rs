//! The request-serving side of a connection: whatever sits on the other
//! end of a `call()` implements this to answer inbound requests.

use std::sync::Arc;

use async_trait::async_trait;
use shardkv_common::wire::Method;

/// Answers one inbound RPC. Implemented by the storage node (for
/// `StorageServer.*`) and by the client library's callback listener (for
/// `LeaseCallbacks.RevokeLease`).
///
/// `payload` and the returned bytes are `bincode`-encoded wire records;
/// `RpcConnection` only ever moves opaque bytes, so encoding/decoding the
/// concrete args/reply types is the handler's job.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, method: Method, payload: Vec<u8>) -> Result<Vec<u8>, String>;
}

#[async_trait]
impl<T: Handler + ?Sized> Handler for Arc<T> {
    async fn handle(&self, method: Method, payload: Vec<u8>) -> Result<Vec<u8>, String> {
        (**self).handle(method, payload).await
    }
}

/// A handler that rejects every call. Useful for connections that are
/// purely outbound (the caller never expects the peer to ring back).
pub struct NullHandler;

#[async_trait]
impl Handler for NullHandler {
    async fn handle(&self, method: Method, _payload: Vec<u8>) -> Result<Vec<u8>, String> {
        Err(format!("no handler registered for {}", method.dotted_name()))
    }
}
