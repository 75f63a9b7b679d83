//! Accept loop: turns every inbound connection into an [`RpcConnection`]
//! bound to a shared [`Handler`]. Used by the storage node to serve
//! `StorageServer.*` calls and by the client library's callback listener to
//! serve `LeaseCallbacks.RevokeLease`.

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::connection::RpcConnection;
use crate::handler::Handler;

/// Runs forever, accepting connections on `listener` and spawning a fresh
/// `RpcConnection` for each with `handler` wired in. Returns only on a
/// listener-level accept error.
pub async fn serve(listener: TcpListener, handler: Arc<dyn Handler>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        stream.set_nodelay(true).ok();
        tracing::debug!(%peer, "accepted rpc connection");
        RpcConnection::from_stream(stream, handler.clone());
    }
}
