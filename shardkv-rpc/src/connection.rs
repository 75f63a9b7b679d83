//! # Multiplexed RPC Connection
//!
//! One TCP connection, both directions at once: either side can issue a
//! `call()` while also answering calls the peer issues on the very same
//! socket. This is what makes the storage node's revoke-then-apply callback
//! (§4.2) possible without a second listening port per peer — the storage
//! node dials the tenant's `host_port` once and reuses that connection for
//! every `RevokeLease` call it needs to make.
//!
//! Modeled on the reference server's single-reader-task-plus-shared-writer
//! split (`server.rs`), generalized from a request/response protocol to a
//! full duplex one by keying in-flight calls on a `call_id` the reader task
//! uses to route each inbound frame to either a pending call or the
//! registered [`Handler`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use shardkv_common::wire::Method;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::RpcError;
use crate::frame::{read_frame, write_frame, Envelope, EnvelopeBody};
use crate::handler::Handler;

type PendingMap = Arc<DashMap<u64, oneshot::Sender<Result<Vec<u8>, String>>>>;

/// A live, demultiplexed connection to a peer. Cloning shares the same
/// underlying socket and pending-call table; every clone can `call()`
/// independently.
#[derive(Clone)]
pub struct RpcConnection {
    next_call_id: Arc<AtomicU64>,
    pending: PendingMap,
    outbox: mpsc::UnboundedSender<Envelope>,
    closed: Arc<tokio::sync::Notify>,
    is_closed: Arc<AtomicBool>,
}

impl RpcConnection {
    /// Dials `addr` and spins up reader/writer tasks. `handler` answers
    /// whatever the peer calls back on this same connection.
    pub async fn connect(addr: &str, handler: Arc<dyn Handler>) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        Ok(Self::from_stream(stream, handler))
    }

    /// Wraps an already-accepted or already-dialed stream. Used by both the
    /// server's accept loop and the client's outbound connection pool.
    pub fn from_stream(stream: TcpStream, handler: Arc<dyn Handler>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::spawn(read_half, write_half, handler)
    }

    fn spawn<R, W>(read_half: R, write_half: W, handler: Arc<dyn Handler>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(DashMap::new());
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel::<Envelope>();
        let closed = Arc::new(tokio::sync::Notify::new());
        let is_closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(writer_loop(write_half, outbox_rx));
        tokio::spawn(reader_loop(
            read_half,
            pending.clone(),
            outbox_tx.clone(),
            handler,
            closed.clone(),
            is_closed.clone(),
        ));

        RpcConnection {
            next_call_id: Arc::new(AtomicU64::new(1)),
            pending,
            outbox: outbox_tx,
            closed,
            is_closed,
        }
    }

    /// Issues `method(payload)` to the peer and awaits its reply, bounded by
    /// `timeout`. Revoke calls use a short timeout (§4.2, I4: the server
    /// treats an unresponsive tenant's lease as already revoked); ordinary
    /// client calls can pass a generous one.
    pub async fn call(
        &self,
        method: Method,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, RpcError> {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(call_id, tx);

        let envelope = Envelope {
            call_id,
            body: EnvelopeBody::Request { method, payload },
        };
        if self.outbox.send(envelope).is_err() {
            self.pending.remove(&call_id);
            return Err(RpcError::Closed);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        match result {
            Ok(Ok(Ok(bytes))) => Ok(bytes),
            Ok(Ok(Err(message))) => Err(RpcError::Remote(message)),
            Ok(Err(_recv_error)) => Err(RpcError::Closed),
            Err(_elapsed) => {
                self.pending.remove(&call_id);
                Err(RpcError::TimedOut)
            }
        }
    }

    /// Resolves once the reader task observes the peer hang up.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    /// True once the reader task has observed EOF or a frame error. A
    /// pool should redial rather than hand this connection out again.
    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::Acquire)
    }
}

async fn writer_loop<W>(write_half: W, mut outbox_rx: mpsc::UnboundedReceiver<Envelope>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let write_half = Mutex::new(write_half);
    while let Some(envelope) = outbox_rx.recv().await {
        let mut guard = write_half.lock().await;
        if write_frame(&mut *guard, &envelope).await.is_err() {
            break;
        }
    }
}

async fn reader_loop<R>(
    mut read_half: R,
    pending: PendingMap,
    outbox: mpsc::UnboundedSender<Envelope>,
    handler: Arc<dyn Handler>,
    closed: Arc<tokio::sync::Notify>,
    is_closed: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    loop {
        let envelope = match read_frame(&mut read_half).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "rpc connection read failed");
                break;
            }
        };

        match envelope.body {
            EnvelopeBody::Response { result } => {
                if let Some((_, tx)) = pending.remove(&envelope.call_id) {
                    let _ = tx.send(result);
                }
            }
            EnvelopeBody::Request { method, payload } => {
                let handler = handler.clone();
                let outbox = outbox.clone();
                let call_id = envelope.call_id;
                tokio::spawn(async move {
                    let result = handler.handle(method, payload).await;
                    let reply = Envelope {
                        call_id,
                        body: EnvelopeBody::Response { result },
                    };
                    let _ = outbox.send(reply);
                });
            }
        }
    }

    // Dropping each sender resolves its waiter with a RecvError, which
    // `call()` surfaces as `RpcError::Closed`.
    pending.clear();
    is_closed.store(true, Ordering::Release);
    closed.notify_waiters();
}

/// Convenience alias for the split-stream halves, kept for callers that want
/// to wire a pre-split stream (e.g. in tests).
pub type SplitStream = (ReadHalf<TcpStream>, WriteHalf<TcpStream>);
