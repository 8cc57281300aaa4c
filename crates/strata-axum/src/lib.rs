//! strata-axum: page caching middleware for axum
//!
//! [`PageCacheLayer`] runs every request through a
//! [`PageCacheEngine`](strata_http::PageCacheEngine). Handlers can steer the
//! capture of their response with the [`PageControl`] extractor.

pub mod extractor;
pub mod layer;
pub mod middleware;

pub use extractor::PageControl;
pub use layer::PageCacheLayer;
pub use middleware::PageCacheMiddleware;

#[cfg(test)]
mod tests;
