//! Cache statistics

use std::collections::BTreeMap;

use crate::CacheOperation;

/// Local-tier footprint of one group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupUsage {
    /// Number of entries held locally
    pub entries: usize,
    /// Encoded size of those entries in bytes
    pub bytes: usize,
}

/// Read-only snapshot of an object cache instance
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits (either tier)
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Remote calls issued, by operation
    pub remote_calls: BTreeMap<CacheOperation, u64>,
    /// Whether the remote store is in use
    pub connected: bool,
    /// Local-tier usage by group
    pub groups: BTreeMap<String, GroupUsage>,
}

impl CacheStats {
    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total lookups (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Total round trips to the remote store
    pub fn total_remote_calls(&self) -> u64 {
        self.remote_calls.values().sum()
    }

    /// Calls issued for one operation
    pub fn remote_calls_for(&self, operation: CacheOperation) -> u64 {
        self.remote_calls.get(&operation).copied().unwrap_or_default()
    }

    /// Total locally held bytes
    pub fn local_bytes(&self) -> usize {
        self.groups.values().map(|g| g.bytes).sum()
    }
}
