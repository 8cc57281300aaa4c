//! Core traits for cache operations

mod instrument;
mod logging;
mod store;

pub use instrument::{CacheMetrics, CacheOperation, CacheTier, NoopMetrics};
pub use logging::TracingMetrics;
pub use store::KvStore;

#[cfg(feature = "metrics")]
pub use instrument::MetricsCrateAdapter;
