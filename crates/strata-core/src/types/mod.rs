//! Core types for cache operations

mod state;
mod stats;

pub use state::PageState;
pub use stats::{CacheStats, GroupUsage};
