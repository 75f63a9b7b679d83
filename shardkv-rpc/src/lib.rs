//! Bidirectional multiplexed RPC transport shared by the storage node and
//! the client library (§4.4). A single TCP connection carries requests in
//! both directions at once, keyed by a per-call `call_id`, so the storage
//! node can call back into a tenant's callback listener on the same socket
//! the tenant used to reach it.

pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod listener;
pub mod pool;

pub use connection::RpcConnection;
pub use error::RpcError;
pub use frame::{Envelope, EnvelopeBody};
pub use handler::{Handler, NullHandler};
pub use listener::serve;
pub use pool::PeerPool;
