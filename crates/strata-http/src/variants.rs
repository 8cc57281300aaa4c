//! Named variant dimensions that extend a request fingerprint

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::RequestContext;

/// Pure function computing one variant dimension
pub type VariantFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

#[derive(Clone)]
struct Variant {
    func: VariantFn,
    optional: bool,
}

/// Registry of variant dimensions, kept sorted by name.
///
/// Required dimensions apply to every request. Optional ones only apply to
/// URLs whose render opted into them; that choice is remembered per URL.
#[derive(Clone, Default)]
pub struct VariantRegistry {
    variants: BTreeMap<String, Variant>,
}

impl VariantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dimension evaluated for every request
    pub fn register<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(func), false);
        self
    }

    /// Register a dimension that a render must activate
    pub fn register_optional<F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.insert(name.into(), Arc::new(func), true);
        self
    }

    /// Vary on the value of a request header
    pub fn header(self, header: &str) -> Self {
        let header = header.to_ascii_lowercase();
        let name = format!("header:{header}");
        self.register(name, move |req| req.header(&header).unwrap_or_default().to_string())
    }

    /// Vary on the value of a cookie, once a render activates it
    pub fn cookie(self, cookie: &str) -> Self {
        let cookie = cookie.to_string();
        let name = format!("cookie:{cookie}");
        self.register_optional(name, move |req| req.cookie(&cookie).unwrap_or_default().to_string())
    }

    fn insert(&mut self, name: String, func: VariantFn, optional: bool) {
        self.variants.insert(name, Variant { func, optional });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.variants.get(name).is_some_and(|v| v.optional)
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Names of the dimensions that apply to every request
    pub fn required(&self) -> BTreeSet<String> {
        self.variants
            .iter()
            .filter(|(_, v)| !v.optional)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Required dimensions plus the registered subset of `activated`
    pub fn active<'a>(&self, activated: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        let mut active = self.required();
        active.extend(activated.into_iter().filter(|n| self.contains(n)).cloned());
        active
    }

    /// Evaluate `names` in sorted order. Unknown names are skipped.
    pub fn evaluate(&self, names: &BTreeSet<String>, request: &RequestContext) -> BTreeMap<String, String> {
        names
            .iter()
            .filter_map(|name| {
                let variant = self.variants.get(name)?;
                Some((name.clone(), (variant.func)(request)))
            })
            .collect()
    }
}

impl fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.variants.iter().map(|(name, v)| (name, v.optional)))
            .finish()
    }
}
