//! # Core Value Types
//!
//! Node descriptors, leases, tenant records, and the lease-timing
//! configuration shared between the storage node and the client library.

use serde::{Deserialize, Serialize};

/// A storage node's identity: a random `u32` chosen at launch plus the
/// address it listens on. Equality is by `node_id` alone (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub node_id: u32,
    pub host_port: String,
}

impl PartialEq for NodeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.node_id == other.node_id
    }
}
impl Eq for NodeDescriptor {}

/// A lease granted alongside a read reply.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Lease {
    pub granted: bool,
    pub valid_seconds: u32,
}

/// A tenant entry recorded by the storage node for a leased key: who holds
/// the lease and when it was (re)granted, in Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub host_port: String,
    pub granted_at_unix: i64,
}

impl Tenant {
    /// The instant past which the server no longer considers this tenant's
    /// lease possibly live (§3: `grantedAt + leaseSeconds + guardSeconds`).
    pub fn guarded_expiry_unix(&self, config: &LeaseConfig) -> i64 {
        self.granted_at_unix + config.lease_seconds as i64 + config.guard_seconds as i64
    }
}

/// Process-wide lease timing and adaptive-cache policy knobs. Carries the
/// reference defaults but is a normal configuration value, not a compiled
/// constant, so tests can shrink the windows.
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    /// How long a granted lease is valid for, from the client's point of
    /// view.
    pub lease_seconds: u32,
    /// Extra margin the server adds on top of `lease_seconds` before it
    /// considers a tenant's lease definitely expired (§3, I2).
    pub guard_seconds: u32,
    /// `Normal` mode: minimum reads within `query_cache_seconds` before the
    /// client starts requesting leases.
    pub query_cache_thresh: usize,
    /// `Normal` mode: the window the threshold is measured over.
    pub query_cache_seconds: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        LeaseConfig {
            lease_seconds: 10,
            guard_seconds: 2,
            query_cache_thresh: 3,
            query_cache_seconds: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_expiry_adds_both_margins() {
        let config = LeaseConfig {
            lease_seconds: 10,
            guard_seconds: 2,
            ..Default::default()
        };
        let tenant = Tenant {
            host_port: "127.0.0.1:9000".to_string(),
            granted_at_unix: 100,
        };
        assert_eq!(tenant.guarded_expiry_unix(&config), 112);
    }

    #[test]
    fn node_descriptor_equality_ignores_host_port() {
        let a = NodeDescriptor { node_id: 1, host_port: "a:1".into() };
        let b = NodeDescriptor { node_id: 1, host_port: "b:2".into() };
        assert_eq!(a, b);
    }
}
