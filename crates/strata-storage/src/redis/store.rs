use async_trait::async_trait;
use bb8::{Pool, PooledConnection, RunError};
use bb8_redis::RedisConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use std::sync::LazyLock;

use strata_core::{CacheError, KvStore, Result};

use super::config::RedisConfig;

/// SCAN + DEL loop executed server-side so a prefix flush is one round trip.
///
/// Runs in O(keyspace); the server is blocked for the duration.
static DELETE_BY_PREFIX: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local cursor = "0"
local removed = 0
repeat
    local reply = redis.call("SCAN", cursor, "MATCH", ARGV[1], "COUNT", 1000)
    cursor = reply[1]
    for _, key in ipairs(reply[2]) do
        removed = removed + redis.call("DEL", key)
    end
until cursor == "0"
return removed
"#,
    )
});

/// INCRBY that never creates the key, so an expiring counter cannot come back
/// without its TTL.
static INCREMENT_EXISTING: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("EXISTS", KEYS[1]) == 1 then
    return redis.call("INCRBY", KEYS[1], ARGV[1])
end
return false
"#,
    )
});

/// [`KvStore`] backed by a pooled Redis connection
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool<RedisConnectionManager>,
    config: RedisConfig,
}

impl RedisStore {
    /// Create a new Redis store.
    ///
    /// Building the pool does not require the server to be up; use
    /// [`KvStore::ping`] to check connectivity.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Config(e.to_string()))?;

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(config.connection_timeout)
            .build_unchecked(manager);

        Ok(Self { pool, config })
    }

    /// The configuration this store was built from
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    async fn connection(&self) -> Result<PooledConnection<'_, RedisConnectionManager>> {
        self.pool.get().await.map_err(|e| match e {
            RunError::User(err) => map_redis_error(err),
            RunError::TimedOut => CacheError::Timeout,
        })
    }
}

fn map_redis_error(err: RedisError) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Connection(err.to_string())
    } else {
        CacheError::Backend(err.to_string())
    }
}

fn map_counter_error(key: &str, err: RedisError) -> CacheError {
    if err.to_string().contains("not an integer") {
        CacheError::TypeMismatch(key.to_string())
    } else {
        map_redis_error(err)
    }
}

/// Escape glob metacharacters so `prefix` matches literally in SCAN MATCH
fn glob_escape(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('*');
    escaped
}

#[async_trait]
impl KvStore for RedisStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(key, value).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
        if ttl_secs == 0 {
            return self.set(key, value).await;
        }
        let mut conn = self.connection().await?;
        let _: () = conn
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn add_if_absent(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<bool> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if ttl_secs > 0 {
            cmd.arg("EX").arg(ttl_secs);
        }
        let reply: Option<String> = cmd.query_async(&mut *conn).await.map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let removed: u64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection().await?;
        conn.incr(key, delta)
            .await
            .map_err(|e| map_counter_error(key, e))
    }

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.connection().await?;
        conn.decr(key, delta)
            .await
            .map_err(|e| map_counter_error(key, e))
    }

    async fn increment_existing(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        let mut conn = self.connection().await?;
        INCREMENT_EXISTING
            .key(key)
            .arg(delta)
            .invoke_async(&mut *conn)
            .await
            .map_err(|e| map_counter_error(key, e))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        conn.exists(key).await.map_err(map_redis_error)
    }

    async fn flush_all(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let removed: u64 = DELETE_BY_PREFIX
            .arg(glob_escape(prefix))
            .invoke_async(&mut *conn)
            .await
            .map_err(map_redis_error)?;
        tracing::debug!(target: "strata", prefix, removed, "deleted keys by prefix");
        Ok(removed)
    }
}
