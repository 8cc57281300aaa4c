//! strata: two-tier object cache
//!
//! An [`ObjectCache`] keeps a private local tier in front of a shared remote
//! [`KvStore`], derives namespaced keys, clamps TTLs and keeps selected groups
//! out of the remote store entirely. When the store is unreachable it keeps
//! working from the local tier.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new(MemoryConfig::default()));
//!     let cache = ObjectCache::connect(store, ObjectCacheConfig::new("app_")).await?;
//!
//!     cache.set("answer", &42i64, "numbers", 60).await;
//!     assert_eq!(cache.get::<i64>("answer", "numbers").await, Some(42));
//!     assert_eq!(cache.incr("answer", 1, "numbers").await, Some(43));
//!
//!     Ok(())
//! }
//! ```

mod object_cache;

// Re-export core
pub use strata_core::*;

// Re-export storage
#[cfg(feature = "memory")]
pub use strata_storage::{MemoryConfig, MemoryStore};

#[cfg(feature = "redis")]
pub use strata_storage::{RedisConfig, RedisStore};

pub use object_cache::{ObjectCache, ObjectCacheConfig};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CacheError, CacheKey, CacheMetrics, CacheStats, KvStore, ObjectCache, ObjectCacheConfig,
        Result,
    };

    #[cfg(feature = "memory")]
    pub use crate::{MemoryConfig, MemoryStore};

    #[cfg(feature = "redis")]
    pub use crate::{RedisConfig, RedisStore};
}
