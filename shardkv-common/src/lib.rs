//! Shared types for the sharded KV store: the hash ring, wire-visible
//! request/reply records, and the error taxonomy the client and server
//! crates both translate into.

pub mod error;
pub mod hash;
pub mod ring;
pub mod types;
pub mod wire;

pub use error::{HkvError, HkvResult, Status};
pub use hash::fnv1_32;
pub use ring::Ring;
pub use types::{Lease, LeaseConfig, NodeDescriptor, Tenant};
