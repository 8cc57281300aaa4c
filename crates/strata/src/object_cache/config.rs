//! Object cache configuration

use strata_core::KeyCodec;

/// Configuration for [`ObjectCache`](super::ObjectCache)
#[derive(Debug, Clone, Default)]
pub struct ObjectCacheConfig {
    /// Namespace salt prepended to every derived key
    pub key_salt: String,
    /// Tenant (site) prefix
    pub tenant_prefix: String,
    /// Prefix shared by global groups
    pub global_prefix: String,
    /// Groups whose keys are shared across tenants
    pub global_groups: Vec<String>,
    /// Groups kept in the local tier only
    pub ignored_groups: Vec<String>,
    /// Upper bound for any TTL, in seconds (0 = unbounded)
    pub max_ttl: u64,
    /// When set, `flush` deletes only keys starting with this prefix
    pub flush_prefix: Option<String>,
    /// Fail construction instead of degrading when the store is unreachable
    pub strict: bool,
}

impl ObjectCacheConfig {
    /// Create config with the given key salt
    pub fn new(key_salt: impl Into<String>) -> Self {
        Self {
            key_salt: key_salt.into(),
            ..Default::default()
        }
    }

    /// Set the tenant prefix
    pub fn tenant_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tenant_prefix = prefix.into();
        self
    }

    /// Set the global prefix
    pub fn global_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.global_prefix = prefix.into();
        self
    }

    /// Add global groups
    pub fn global_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Add groups that never reach the remote store
    pub fn ignored_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Clamp every TTL to at most `secs`
    pub fn max_ttl(mut self, secs: u64) -> Self {
        self.max_ttl = secs;
        self
    }

    /// Scope `flush` to keys starting with `prefix`
    pub fn flush_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.flush_prefix = Some(prefix.into());
        self
    }

    /// Fail construction when the store is unreachable
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Apply the TTL clamp
    pub fn effective_ttl(&self, ttl: u64) -> u64 {
        if self.max_ttl > 0 && (ttl == 0 || ttl > self.max_ttl) {
            self.max_ttl
        } else {
            ttl
        }
    }

    pub(crate) fn key_codec(&self) -> KeyCodec {
        KeyCodec::new(self.key_salt.clone())
            .with_tenant_prefix(self.tenant_prefix.clone())
            .with_global_prefix(self.global_prefix.clone())
            .with_global_groups(self.global_groups.iter().cloned())
    }
}
