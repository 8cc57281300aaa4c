//! In-memory key-value store using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use strata_core::{CacheError, Clock, KvStore, Result, SystemClock};

/// Configuration for the memory store
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of entries (0 = unlimited)
    pub max_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_capacity: 100_000,
        }
    }
}

impl MemoryConfig {
    /// Create config with specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            max_capacity: capacity,
        }
    }

    /// Create config with unlimited capacity
    pub fn unlimited() -> Self {
        Self { max_capacity: 0 }
    }
}

#[derive(Debug, Clone)]
struct Item {
    value: Vec<u8>,
    expires_at: Option<u64>,
}

impl Item {
    fn new(value: &[u8], ttl_secs: u64, now: u64) -> Self {
        Self {
            value: value.to_vec(),
            expires_at: (ttl_secs > 0).then(|| now.saturating_add(ttl_secs)),
        }
    }

    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process [`KvStore`] with Redis-like semantics.
///
/// Expiry is enforced lazily against the configured [`Clock`]. Cloning
/// creates a new handle to the SAME underlying data.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Item>>,
    clock: Arc<dyn Clock>,
    offline: Arc<AtomicBool>,
    config: MemoryConfig,
}

impl MemoryStore {
    /// Create a new memory store on the system clock
    pub fn new(config: MemoryConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Create a store that reads time from `clock`
    pub fn with_clock(config: MemoryConfig, clock: impl Clock) -> Self {
        Self {
            data: Arc::new(DashMap::with_capacity(config.max_capacity.min(10_000))),
            clock: Arc::new(clock),
            offline: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MemoryConfig::default())
    }

    /// Simulate an outage: while offline every operation fails with a
    /// connection error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    /// Whether the store holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.data.len();
        self.data.retain(|_, item| item.is_live(now));
        before - self.data.len()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Evict entries if at capacity
    fn maybe_evict(&self, incoming: &str) {
        if self.config.max_capacity == 0
            || self.data.len() < self.config.max_capacity
            || self.data.contains_key(incoming)
        {
            return;
        }

        if self.purge_expired() > 0 && self.data.len() < self.config.max_capacity {
            return;
        }

        let excess = self.data.len() + 1 - self.config.max_capacity;
        let victims: Vec<String> = self
            .data
            .iter()
            .take(excess)
            .map(|entry| entry.key().clone())
            .collect();

        for key in victims {
            self.data.remove(&key);
        }
        tracing::debug!(target: "strata", evicted = excess, "memory store at capacity");
    }

    fn live_value(&self, key: &str, now: u64) -> Option<Vec<u8>> {
        let item = self.data.get(key)?;
        if item.is_live(now) {
            return Some(item.value.clone());
        }
        drop(item);
        self.data.remove_if(key, |_, item| !item.is_live(now));
        None
    }

    fn apply_delta(&self, key: &str, delta: i64) -> Result<i64> {
        self.check_online()?;
        let now = self.clock.now();
        self.maybe_evict(key);

        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let current = parse_counter(key, &occupied.get().value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::Backend(format!("increment overflow: {key}")))?;
                occupied.get_mut().value = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(Item::new(delta.to_string().as_bytes(), 0, now));
                Ok(delta)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Item::new(delta.to_string().as_bytes(), 0, now));
                Ok(delta)
            }
        }
    }
}

impl MemoryStore {
    fn apply_delta_existing(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        self.check_online()?;
        let now = self.clock.now();

        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_live(now) => {
                let current = parse_counter(key, &occupied.get().value)?;
                let next = current
                    .checked_add(delta)
                    .ok_or_else(|| CacheError::Backend(format!("increment overflow: {key}")))?;
                occupied.get_mut().value = next.to_string().into_bytes();
                Ok(Some(next))
            }
            Entry::Occupied(occupied) => {
                occupied.remove();
                Ok(None)
            }
            Entry::Vacant(_) => Ok(None),
        }
    }
}

fn parse_counter(key: &str, value: &[u8]) -> Result<i64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CacheError::TypeMismatch(key.to_string()))
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_online()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_online()?;
        Ok(self.live_value(key, self.clock.now()))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        self.check_online()?;
        let now = self.clock.now();
        Ok(keys.iter().map(|key| self.live_value(key, now)).collect())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set_with_ttl(key, value, 0).await
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<()> {
        self.check_online()?;
        self.maybe_evict(key);
        self.data
            .insert(key.to_string(), Item::new(value, ttl_secs, self.clock.now()));
        Ok(())
    }

    async fn add_if_absent(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<bool> {
        self.check_online()?;
        let now = self.clock.now();
        self.maybe_evict(key);

        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(Item::new(value, ttl_secs, now));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Item::new(value, ttl_secs, now));
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        let now = self.clock.now();
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, item)| item.is_live(now)))
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        self.apply_delta(key, delta)
    }

    async fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let delta = delta
            .checked_neg()
            .ok_or_else(|| CacheError::Backend(format!("decrement overflow: {key}")))?;
        self.apply_delta(key, delta)
    }

    async fn increment_existing(&self, key: &str, delta: i64) -> Result<Option<i64>> {
        self.apply_delta_existing(key, delta)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.live_value(key, self.clock.now()).is_some())
    }

    async fn flush_all(&self) -> Result<()> {
        self.check_online()?;
        self.data.clear();
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64> {
        self.check_online()?;
        let now = self.clock.now();
        let mut removed = 0u64;
        self.data.retain(|key, item| {
            if key.starts_with(prefix) {
                if item.is_live(now) {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}
