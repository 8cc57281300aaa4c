use crate::{CacheMetrics, CacheOperation, CacheTier, PageState};
use std::time::Duration;
use tracing::{debug, warn};

/// Metrics adapter that logs events via `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    /// Service name/prefix (optional)
    service_name: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with service name prefix
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, key: &str, tier: CacheTier) {
        debug!(
            target: "strata",
            event = "hit",
            key = %key,
            tier = tier.as_str(),
            service = ?self.service_name,
            "cache hit"
        );
    }

    fn record_miss(&self, key: &str) {
        debug!(
            target: "strata",
            event = "miss",
            key = %key,
            service = ?self.service_name,
            "cache miss"
        );
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        tracing::trace!(
            target: "strata",
            event = "latency",
            operation = operation.as_str(),
            duration_us = duration.as_micros() as u64,
            service = ?self.service_name,
            "remote call"
        );
    }

    fn record_offline(&self) {
        warn!(
            target: "strata",
            event = "offline",
            service = ?self.service_name,
            "object cache running local-only"
        );
    }

    fn record_page(&self, state: PageState) {
        debug!(
            target: "strata",
            event = "page",
            state = state.as_str(),
            service = ?self.service_name,
            "page cache outcome"
        );
    }
}
