//! strata-storage: Key-value store implementations for strata
//!
//! Every store implements [`strata_core::KvStore`]. [`MemoryStore`] keeps data
//! in process and is the reference implementation used in tests;
//! `RedisStore` (feature `redis`) talks to a Redis server through a pooled
//! connection.

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "memory")]
pub use memory::{MemoryConfig, MemoryStore};

#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisStore};
