//! strata-http: adaptive full-page cache
//!
//! [`PageCacheEngine`] sits in front of a page renderer. Per request it
//! fingerprints the request, consults the object cache and either returns a
//! stored response or lets the request render, storing the result once the
//! page has been requested often enough to be worth caching.

pub mod cache_control;
pub mod conditional;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod headers;
pub mod record;
pub mod request;
pub mod variants;

pub use cache_control::CacheControl;
pub use config::PageCacheConfig;
pub use engine::{Lookup, PageCacheEngine, PageResponse, PendingRender};
pub use headers::do_headers;
pub use record::{HeaderBytes, PageRecord};
pub use request::RequestContext;
pub use variants::{VariantFn, VariantRegistry};

#[cfg(test)]
mod tests;
