//! Remote key-value store capability

use async_trait::async_trait;

use crate::Result;

/// The operations the object cache needs from a remote store.
///
/// Keys arrive fully derived; implementations must not rewrite them. A TTL of
/// zero means "no expiration". Implementations are expected to be shared
/// across requests behind an `Arc`.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Fetch a value
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Fetch many values in one round trip, in input order
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Store a value without expiration
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Store a value that expires after `ttl_secs`
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()>;

    /// Atomically store a value only if the key is absent.
    ///
    /// Returns `true` if this call created the key.
    async fn add_if_absent(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<bool>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically add `delta` to an integer value and return the result
    async fn increment(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomically subtract `delta` from an integer value and return the result
    async fn decrement(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomically add `delta` to an existing integer value.
    ///
    /// Returns `None` without creating anything when the key is absent or
    /// expired, so the key keeps whatever TTL it was created with.
    async fn increment_existing(&self, key: &str, delta: i64) -> Result<Option<i64>>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove every key in the store
    async fn flush_all(&self) -> Result<()>;

    /// Remove every key starting with `prefix` in one server-side step.
    ///
    /// Returns the number of keys removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64>;
}
