//! Two-tier object cache

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use strata_core::{
    CacheError, CacheKey, CacheMetrics, CacheOperation, CacheStats, CacheTier, GroupUsage,
    KeyCodec, KvStore, NoopMetrics, Result, ValueCodec, normalize_group,
};

mod config;
pub use config::ObjectCacheConfig;

#[derive(Debug, Clone)]
struct LocalEntry {
    group: String,
    bytes: Vec<u8>,
}

/// Key-value cache with a private local tier in front of a shared [`KvStore`].
///
/// Values are held locally in encoded form, so every read hands out a fresh
/// copy. Groups listed as ignored never reach the remote store. When the store
/// cannot be reached the instance degrades to local-only for the rest of its
/// life; store errors are logged and reported as `false`/`None`, never
/// returned.
///
/// An instance is meant to live for one request (or one unit of work) and be
/// passed around by reference.
pub struct ObjectCache<S, M = NoopMetrics>
where
    S: KvStore,
    M: CacheMetrics,
{
    store: Arc<S>,
    metrics: Arc<M>,
    config: ObjectCacheConfig,
    keys: RwLock<KeyCodec>,
    ignored_groups: RwLock<HashSet<String>>,
    local: DashMap<String, LocalEntry>,
    connected: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    remote_calls: Mutex<BTreeMap<CacheOperation, u64>>,
}

impl<S: KvStore> ObjectCache<S, NoopMetrics> {
    /// Connect to `store` without metrics.
    ///
    /// Fails only in strict mode; otherwise an unreachable store yields a
    /// local-only instance.
    pub async fn connect(store: Arc<S>, config: ObjectCacheConfig) -> Result<Self> {
        Self::connect_with_metrics(store, config, Arc::new(NoopMetrics)).await
    }
}

impl<S, M> ObjectCache<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    /// Connect to `store`, reporting through `metrics`
    pub async fn connect_with_metrics(
        store: Arc<S>,
        config: ObjectCacheConfig,
        metrics: Arc<M>,
    ) -> Result<Self> {
        let cache = Self {
            keys: RwLock::new(config.key_codec()),
            ignored_groups: RwLock::new(config.ignored_groups.iter().cloned().collect()),
            store,
            metrics,
            config,
            local: DashMap::new(),
            connected: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            remote_calls: Mutex::new(BTreeMap::new()),
        };

        cache.count_call(CacheOperation::Ping);
        if let Err(err) = cache.store.ping().await {
            if cache.config.strict {
                return Err(err);
            }
            cache.go_offline(&err);
        }
        Ok(cache)
    }

    /// Configuration this instance was built with
    pub fn config(&self) -> &ObjectCacheConfig {
        &self.config
    }

    /// Metrics sink shared with this instance
    pub fn metrics(&self) -> &Arc<M> {
        &self.metrics
    }

    /// Whether the remote store is in use
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Derive the store key for `key` in `group`
    pub fn derive_key(&self, key: impl CacheKey, group: &str) -> String {
        self.keys.read().derive(&key.cache_key(), group)
    }

    /// Whether `group` reaches the remote store
    pub fn is_remote_group(&self, group: &str) -> bool {
        self.is_connected() && !self.ignored_groups.read().contains(normalize_group(group))
    }

    /// Store only if the key is absent from both tiers
    pub async fn add<T: Serialize + ?Sized>(
        &self,
        key: impl CacheKey,
        value: &T,
        group: &str,
        ttl: u64,
    ) -> bool {
        let Some(bytes) = encode(value) else {
            return false;
        };
        let derived = self.derive_key(key, group);
        if self.local.contains_key(&derived) {
            return false;
        }

        if self.is_remote_group(group) {
            let ttl = self.config.effective_ttl(ttl);
            let added = self
                .remote(
                    CacheOperation::Add,
                    self.store.add_if_absent(&derived, &bytes, ttl),
                )
                .await
                .unwrap_or(false);
            if added {
                self.store_local(derived, group, bytes);
            }
            return added;
        }

        self.store_local(derived, group, bytes);
        true
    }

    /// Store only if the key already exists in either tier
    pub async fn replace<T: Serialize + ?Sized>(
        &self,
        key: impl CacheKey,
        value: &T,
        group: &str,
        ttl: u64,
    ) -> bool {
        let key = key.cache_key();
        if !self.exists(key.as_str(), group).await {
            return false;
        }
        self.set(key, value, group, ttl).await
    }

    /// Unconditional upsert
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: impl CacheKey,
        value: &T,
        group: &str,
        ttl: u64,
    ) -> bool {
        match encode(value) {
            Some(bytes) => self.write(key, bytes, group, ttl).await,
            None => false,
        }
    }

    /// Store opaque bytes
    pub async fn set_bytes(&self, key: impl CacheKey, bytes: &[u8], group: &str, ttl: u64) -> bool {
        self.write(key, ValueCodec::encode_bytes(bytes), group, ttl)
            .await
    }

    /// Fetch a value, preferring the local tier
    pub async fn get<T: DeserializeOwned>(&self, key: impl CacheKey, group: &str) -> Option<T> {
        self.read(key, group, false, ValueCodec::decode).await
    }

    /// Fetch a value from the remote store, skipping the local tier.
    ///
    /// Remote-exempt groups (or an offline instance) still answer from the
    /// local tier.
    pub async fn get_fresh<T: DeserializeOwned>(
        &self,
        key: impl CacheKey,
        group: &str,
    ) -> Option<T> {
        self.read(key, group, true, ValueCodec::decode).await
    }

    /// Fetch opaque bytes stored with [`set_bytes`](Self::set_bytes)
    pub async fn get_bytes(&self, key: impl CacheKey, group: &str) -> Option<Vec<u8>> {
        self.read(key, group, false, ValueCodec::decode_bytes).await
    }

    /// Fetch many keys, grouped by cache group.
    ///
    /// Issues at most one remote round trip per remote-eligible group. The
    /// result is keyed by derived key; absent entries map to `None`.
    pub async fn get_multi<T, K>(&self, groups: &[(&str, &[K])]) -> HashMap<String, Option<T>>
    where
        T: DeserializeOwned,
        K: CacheKey,
    {
        let mut found = HashMap::new();

        for (group, keys) in groups {
            let mut pending = Vec::new();
            for key in keys.iter() {
                let derived = self.derive_key(key, group);
                match self.local_bytes(&derived) {
                    Some(bytes) => {
                        let value = self.decode_hit(&derived, &bytes, CacheTier::Local, ValueCodec::decode);
                        found.insert(derived, value);
                    }
                    None => pending.push(derived),
                }
            }

            if pending.is_empty() {
                continue;
            }

            let fetched = if self.is_remote_group(group) {
                self.remote(CacheOperation::GetMulti, self.store.mget(&pending))
                    .await
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            let mut fetched = fetched.into_iter();

            for derived in pending {
                let value = match fetched.next().flatten() {
                    Some(bytes) => {
                        let value =
                            self.decode_hit(&derived, &bytes, CacheTier::Remote, ValueCodec::decode);
                        if value.is_some() {
                            self.store_local(derived.clone(), group, bytes);
                        }
                        value
                    }
                    None => {
                        self.record_miss(&derived);
                        None
                    }
                };
                found.insert(derived, value);
            }
        }

        found
    }

    /// Remove a key.
    ///
    /// For remote-eligible groups the remote result is returned.
    pub async fn delete(&self, key: impl CacheKey, group: &str) -> bool {
        let derived = self.derive_key(key, group);
        let removed_locally = self.local.remove(&derived).is_some();

        if !self.is_remote_group(group) {
            return removed_locally;
        }
        self.remote(CacheOperation::Delete, self.store.delete(&derived))
            .await
            .unwrap_or(false)
    }

    /// Whether the key exists in either tier
    pub async fn exists(&self, key: impl CacheKey, group: &str) -> bool {
        let derived = self.derive_key(key, group);
        if self.local.contains_key(&derived) {
            return true;
        }
        if !self.is_remote_group(group) {
            return false;
        }
        self.remote(CacheOperation::Exists, self.store.exists(&derived))
            .await
            .unwrap_or(false)
    }

    /// Add `offset` to an integer value, returning `None` if the key is absent
    pub async fn incr(&self, key: impl CacheKey, offset: i64, group: &str) -> Option<i64> {
        self.apply_offset(key, offset, group, CacheOperation::Incr)
            .await
    }

    /// Subtract `offset` from an integer value, returning `None` if the key is
    /// absent. The result may go below zero.
    pub async fn decr(&self, key: impl CacheKey, offset: i64, group: &str) -> Option<i64> {
        self.apply_offset(key, offset, group, CacheOperation::Decr)
            .await
    }

    /// Clear the local tier and the remote keyspace.
    ///
    /// The remote side is scoped to the flush prefix (or the key salt) when
    /// one is set, otherwise the whole store is flushed.
    pub async fn flush(&self) -> bool {
        self.flush_local();
        if !self.is_connected() {
            return true;
        }

        let scope = self
            .config
            .flush_prefix
            .clone()
            .or_else(|| Some(self.config.key_salt.clone()).filter(|salt| !salt.is_empty()));

        match scope {
            Some(prefix) => {
                let removed = self
                    .remote(CacheOperation::Flush, self.store.delete_by_prefix(&prefix))
                    .await;
                debug!(target: "strata", prefix = %prefix, removed = ?removed, "scoped flush");
                removed.is_some()
            }
            None => self
                .remote(CacheOperation::Flush, self.store.flush_all())
                .await
                .is_some(),
        }
    }

    /// Clear only the local tier
    pub fn flush_local(&self) {
        self.local.clear();
    }

    /// Switch the tenant prefix for subsequent operations
    pub fn switch_tenant(&self, prefix: impl Into<String>) {
        self.keys.write().set_tenant_prefix(prefix);
    }

    /// Extend the set of tenant-independent groups
    pub fn add_global_groups<I, G>(&self, groups: I)
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.keys.write().add_global_groups(groups);
    }

    /// Extend the set of local-only groups
    pub fn add_ignored_groups<I, G>(&self, groups: I)
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.ignored_groups
            .write()
            .extend(groups.into_iter().map(Into::into));
    }

    /// Snapshot of counters and local-tier usage
    pub fn stats(&self) -> CacheStats {
        let mut groups: BTreeMap<String, GroupUsage> = BTreeMap::new();
        for entry in self.local.iter() {
            let usage = groups.entry(entry.group.clone()).or_default();
            usage.entries += 1;
            usage.bytes += entry.bytes.len();
        }

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_calls: self.remote_calls.lock().clone(),
            connected: self.is_connected(),
            groups,
        }
    }

    async fn write(&self, key: impl CacheKey, bytes: Vec<u8>, group: &str, ttl: u64) -> bool {
        let derived = self.derive_key(key, group);

        if self.is_remote_group(group) {
            let ttl = self.config.effective_ttl(ttl);
            let written = if ttl > 0 {
                self.remote(
                    CacheOperation::Set,
                    self.store.set_with_ttl(&derived, &bytes, ttl),
                )
                .await
            } else {
                self.remote(CacheOperation::Set, self.store.set(&derived, &bytes))
                    .await
            };
            if written.is_none() {
                return false;
            }
        }

        self.store_local(derived, group, bytes);
        true
    }

    async fn read<T>(
        &self,
        key: impl CacheKey,
        group: &str,
        bypass_local: bool,
        decode: fn(&[u8]) -> Result<T>,
    ) -> Option<T> {
        let derived = self.derive_key(key, group);
        let remote = self.is_remote_group(group);

        if !bypass_local || !remote {
            if let Some(bytes) = self.local_bytes(&derived) {
                return self.decode_hit(&derived, &bytes, CacheTier::Local, decode);
            }
        }

        if !remote {
            self.record_miss(&derived);
            return None;
        }

        match self
            .remote(CacheOperation::Get, self.store.get(&derived))
            .await
            .flatten()
        {
            Some(bytes) => {
                let value = self.decode_hit(&derived, &bytes, CacheTier::Remote, decode);
                if value.is_some() {
                    self.store_local(derived, group, bytes);
                }
                value
            }
            None => {
                self.record_miss(&derived);
                None
            }
        }
    }

    async fn apply_offset(
        &self,
        key: impl CacheKey,
        offset: i64,
        group: &str,
        operation: CacheOperation,
    ) -> Option<i64> {
        let derived = self.derive_key(key, group);

        if !self.is_remote_group(group) {
            let mut entry = self.local.get_mut(&derived)?;
            let current = ValueCodec::decode_int(&entry.bytes).unwrap_or_default();
            let next = match operation {
                CacheOperation::Decr => current.saturating_sub(offset),
                _ => current.saturating_add(offset),
            };
            entry.bytes = ValueCodec::encode_int(next);
            return Some(next);
        }

        let delta = match operation {
            CacheOperation::Decr => offset.saturating_neg(),
            _ => offset,
        };
        match self
            .remote(operation, self.store.increment_existing(&derived, delta))
            .await
            .flatten()
        {
            Some(next) => {
                self.store_local(derived, group, ValueCodec::encode_int(next));
                Some(next)
            }
            None => {
                self.local.remove(&derived);
                None
            }
        }
    }

    fn local_bytes(&self, derived: &str) -> Option<Vec<u8>> {
        self.local.get(derived).map(|entry| entry.bytes.clone())
    }

    fn store_local(&self, derived: String, group: &str, bytes: Vec<u8>) {
        self.local.insert(
            derived,
            LocalEntry {
                group: normalize_group(group).to_string(),
                bytes,
            },
        );
    }

    fn decode_hit<T>(
        &self,
        derived: &str,
        bytes: &[u8],
        tier: CacheTier,
        decode: fn(&[u8]) -> Result<T>,
    ) -> Option<T> {
        match decode(bytes) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_hit(derived, tier);
                Some(value)
            }
            Err(err) => {
                warn!(target: "strata", key = %derived, error = %err, "undecodable cache value");
                self.record_miss(derived);
                None
            }
        }
    }

    fn record_miss(&self, derived: &str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_miss(derived);
    }

    fn count_call(&self, operation: CacheOperation) {
        *self.remote_calls.lock().entry(operation).or_default() += 1;
    }

    /// Run one remote call, folding errors into `None`
    async fn remote<T>(
        &self,
        operation: CacheOperation,
        call: impl Future<Output = Result<T>>,
    ) -> Option<T> {
        self.count_call(operation);
        let start = Instant::now();
        let result = call.await;
        self.metrics.record_latency(operation, start.elapsed());

        match result {
            Ok(value) => Some(value),
            Err(err) if err.is_connection() => {
                self.go_offline(&err);
                None
            }
            Err(err) => {
                warn!(
                    target: "strata",
                    operation = operation.as_str(),
                    error = %err,
                    "remote cache call failed"
                );
                None
            }
        }
    }

    fn go_offline(&self, err: &CacheError) {
        if self.connected.swap(false, Ordering::SeqCst) {
            warn!(target: "strata", error = %err, "remote store unreachable; continuing local-only");
            self.metrics.record_offline();
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Option<Vec<u8>> {
    match ValueCodec::encode(value) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            warn!(target: "strata", error = %err, "value cannot be encoded");
            None
        }
    }
}
