//! Logical cache keys and derivation of fully-qualified store keys

use std::collections::HashSet;
use std::fmt::Display;

/// Group used when the caller passes an empty group name
pub const DEFAULT_GROUP: &str = "default";

/// Trait for types that can be used as logical cache keys
///
/// Implement this trait to use custom types as cache keys.
pub trait CacheKey: Send + Sync {
    /// Generate the logical key string
    fn cache_key(&self) -> String;
}

impl CacheKey for str {
    fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl CacheKey for String {
    fn cache_key(&self) -> String {
        self.clone()
    }
}

impl<T: CacheKey + ?Sized> CacheKey for &T {
    fn cache_key(&self) -> String {
        (**self).cache_key()
    }
}

macro_rules! integer_keys {
    ($($ty:ty),*) => {
        $(
            impl CacheKey for $ty {
                fn cache_key(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

integer_keys!(u32, u64, i32, i64, usize);

impl<T1: Display + Send + Sync, T2: Display + Send + Sync> CacheKey for (T1, T2) {
    fn cache_key(&self) -> String {
        format!("{}:{}", self.0, self.1)
    }
}

/// Derives store keys from a logical key, a group and process-wide context.
///
/// The derived form is `salt ++ prefix ++ ":" ++ group ++ ":" ++ key`. The
/// prefix is the tenant prefix, except for global groups which share the
/// tenant-independent global prefix. Group names are configuration and must
/// not contain `:`.
#[derive(Debug, Clone, Default)]
pub struct KeyCodec {
    salt: String,
    tenant_prefix: String,
    global_prefix: String,
    global_groups: HashSet<String>,
}

impl KeyCodec {
    /// Create a codec with the given namespace salt
    pub fn new(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            ..Default::default()
        }
    }

    /// Set the tenant prefix
    pub fn with_tenant_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tenant_prefix = prefix.into();
        self
    }

    /// Set the prefix used by global groups
    pub fn with_global_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.global_prefix = prefix.into();
        self
    }

    /// Add groups that ignore the tenant prefix
    pub fn with_global_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_global_groups(groups);
        self
    }

    /// Switch the tenant prefix in place
    pub fn set_tenant_prefix(&mut self, prefix: impl Into<String>) {
        self.tenant_prefix = prefix.into();
    }

    /// Extend the global group set in place
    pub fn add_global_groups<I, S>(&mut self, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_groups.extend(groups.into_iter().map(Into::into));
    }

    /// Namespace salt
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Current tenant prefix
    pub fn tenant_prefix(&self) -> &str {
        &self.tenant_prefix
    }

    /// Whether `group` bypasses the tenant prefix
    pub fn is_global(&self, group: &str) -> bool {
        self.global_groups.contains(normalize_group(group))
    }

    /// Derive the fully-qualified key
    pub fn derive(&self, key: &str, group: &str) -> String {
        let group = normalize_group(group);
        let prefix = if self.global_groups.contains(group) {
            &self.global_prefix
        } else {
            &self.tenant_prefix
        };
        format!("{}{}:{}:{}", self.salt, prefix, group, key)
    }
}

/// Map the empty group name onto [`DEFAULT_GROUP`]
pub fn normalize_group(group: &str) -> &str {
    if group.is_empty() { DEFAULT_GROUP } else { group }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tenant_scoped_key() {
        let codec = KeyCodec::new("salt_").with_tenant_prefix("7");
        assert_eq!(codec.derive("post-1", "posts"), "salt_7:posts:post-1");
    }

    #[test]
    fn test_global_group_uses_global_prefix() {
        let codec = KeyCodec::new("s")
            .with_tenant_prefix("7")
            .with_global_prefix("net")
            .with_global_groups(["users"]);

        assert!(codec.is_global("users"));
        assert_eq!(codec.derive("42", "users"), "snet:users:42");
        assert_eq!(codec.derive("42", "posts"), "s7:posts:42");
    }

    #[test]
    fn test_empty_group_is_default() {
        let codec = KeyCodec::new("");
        assert_eq!(codec.derive("k", ""), codec.derive("k", DEFAULT_GROUP));
    }

    #[test]
    fn test_switch_tenant() {
        let mut codec = KeyCodec::new("").with_tenant_prefix("1");
        let before = codec.derive("k", "g");
        codec.set_tenant_prefix("2");
        assert_ne!(before, codec.derive("k", "g"));
        assert_eq!(codec.tenant_prefix(), "2");
    }

    #[test]
    fn test_key_impls() {
        assert_eq!("abc".cache_key(), "abc");
        assert_eq!(42u64.cache_key(), "42");
        assert_eq!(("user", 9).cache_key(), "user:9");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Distinct logical keys within one group never share a derived key
        #[test]
        fn prop_distinct_keys_distinct_derivations(
            a in ".{0,24}",
            b in ".{0,24}",
            group in "[a-z_]{1,12}",
        ) {
            prop_assume!(a != b);
            let codec = KeyCodec::new("salt").with_tenant_prefix("t1");
            prop_assert_ne!(codec.derive(&a, &group), codec.derive(&b, &group));
        }

        /// Tenants never share a derived key for a non-global group
        #[test]
        fn prop_tenants_are_isolated(key in ".{0,24}", group in "[a-z_]{1,12}") {
            let one = KeyCodec::new("s").with_tenant_prefix("1");
            let two = KeyCodec::new("s").with_tenant_prefix("2");
            prop_assert_ne!(one.derive(&key, &group), two.derive(&key, &group));
        }
    }
}
