//! # Error Taxonomy
//!
//! Purpose: a single error type shared by the storage node and the client
//! library, so RPC status codes and local failures both flow through one
//! `Result` alias.
//!
//! ## Design Principles
//! 1. **One Enum, Two Sides**: storage-node replies and client-local faults
//!    both fit in `HkvError`; callers match on variants, not on string text.
//! 2. **No Panics On The Data Path**: invariant violations surface as
//!    `HkvError::Internal` instead of aborting the process.

use std::fmt;

/// Result alias used throughout the store.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors surfaced to callers of the storage node or the client library.
#[derive(Debug, thiserror::Error)]
pub enum HkvError {
    /// The key (or list item) does not exist.
    #[error("key not found")]
    NotFound,
    /// `AppendToList` on a value already present in the set.
    #[error("item already exists")]
    ItemExists,
    /// `RemoveFromList` on a value absent from the set.
    #[error("item not found")]
    ItemNotFound,
    /// The contacted node is not the ring-successor of the key's hash.
    #[error("wrong server")]
    WrongServer,
    /// The cluster has not finished bootstrapping.
    #[error("cluster not ready")]
    NotReady,
    /// Connection, timeout, or frame decode failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// An internal invariant was violated; logged rather than panicking.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl HkvError {
    /// True for errors that are routine and recoverable at the caller
    /// (as opposed to routing or transport failures).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HkvError::NotFound | HkvError::ItemExists | HkvError::ItemNotFound
        )
    }
}

impl From<std::io::Error> for HkvError {
    fn from(err: std::io::Error) -> Self {
        HkvError::Transport(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for HkvError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        HkvError::Transport(format!("decode error: {err}"))
    }
}

/// Wire status code carried in RPC replies (§6 of the design). Distinct
/// from `HkvError` because not every status implies a caller-visible error
/// (`OK` has no error counterpart) and because it must be `Serialize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    Ok,
    KeyNotFound,
    ItemExists,
    ItemNotFound,
    WrongServer,
    NotReady,
}

impl Status {
    /// Translates a non-`Ok` status into the matching `HkvError`.
    pub fn into_error(self) -> Option<HkvError> {
        match self {
            Status::Ok => None,
            Status::KeyNotFound => Some(HkvError::NotFound),
            Status::ItemExists => Some(HkvError::ItemExists),
            Status::ItemNotFound => Some(HkvError::ItemNotFound),
            Status::WrongServer => Some(HkvError::WrongServer),
            Status::NotReady => Some(HkvError::NotReady),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
