//! Storage node internals: the sharded value/tenant store, the per-key
//! lock registry that serializes revoke-then-apply, bootstrap, and the
//! `StorageNode` type that answers the storage RPC surface (§4.2).

pub mod bootstrap;
pub mod keylock;
pub mod node;
pub mod store;

pub use keylock::KeyLockRegistry;
pub use node::StorageNode;
pub use store::{ListOutcome, Store};
