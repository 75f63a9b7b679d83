//! Transport-level failures: everything that can go wrong getting bytes to
//! and from a peer, as distinct from the application-level [`Status`] codes
//! carried inside a successful reply payload.

use shardkv_common::error::HkvError;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("connection closed")]
    Closed,
    #[error("call timed out")]
    TimedOut,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("peer rejected call: {0}")]
    Remote(String),
}

impl From<RpcError> for HkvError {
    fn from(err: RpcError) -> Self {
        HkvError::Transport(err.to_string())
    }
}
