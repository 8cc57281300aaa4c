//! Metrics trait for cache observability

use std::time::Duration;

use crate::PageState;

/// Cache tier for metrics labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Per-instance in-memory tier
    Local,
    /// Shared remote store
    Remote,
}

impl CacheTier {
    /// Get tier as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Local => "local",
            CacheTier::Remote => "remote",
        }
    }
}

/// Remote store operation for latency and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheOperation {
    Ping,
    Get,
    GetMulti,
    Set,
    Add,
    Delete,
    Incr,
    Decr,
    Exists,
    Flush,
}

impl CacheOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Ping => "ping",
            CacheOperation::Get => "get",
            CacheOperation::GetMulti => "mget",
            CacheOperation::Set => "set",
            CacheOperation::Add => "add",
            CacheOperation::Delete => "delete",
            CacheOperation::Incr => "incr",
            CacheOperation::Decr => "decr",
            CacheOperation::Exists => "exists",
            CacheOperation::Flush => "flush",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a cache hit
    fn record_hit(&self, key: &str, tier: CacheTier);

    /// Record a cache miss
    fn record_miss(&self, key: &str);

    /// Record remote operation latency
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record that an object cache instance went offline
    fn record_offline(&self);

    /// Record the outcome of a page cache lookup or capture
    fn record_page(&self, state: PageState);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str, _tier: CacheTier) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_offline(&self) {}

    #[inline]
    fn record_page(&self, _state: PageState) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use strata_core::MetricsCrateAdapter;
///
/// let metrics = MetricsCrateAdapter::new("strata");
/// // Emits: strata_hits_total, strata_page_requests_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str, tier: CacheTier) {
        metrics::counter!(self.metric_name("hits_total"), "tier" => tier.as_str()).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("remote_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_offline(&self) {
        metrics::counter!(self.metric_name("offline_total")).increment(1);
    }

    fn record_page(&self, state: PageState) {
        metrics::counter!(
            self.metric_name("page_requests_total"),
            "state" => state.as_str()
        )
        .increment(1);
    }
}
