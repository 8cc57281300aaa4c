//! Page cache configuration

use http::header::TRANSFER_ENCODING;
use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::VariantRegistry;

/// Configuration for [`PageCacheEngine`](crate::PageCacheEngine)
#[derive(Debug, Clone)]
pub struct PageCacheConfig {
    /// Master switch
    pub enabled: bool,
    /// Requests needed within `seconds` before a page is stored
    pub times: u64,
    /// Sampling window in seconds
    pub seconds: u64,
    /// Default freshness of stored pages in seconds (below 1 disables caching)
    pub max_age: u64,
    /// Object cache group holding records, counters and locks
    pub group: String,
    /// Variant dimensions extending the fingerprint
    pub variants: VariantRegistry,
    /// Headers added to every stored and served page
    pub static_headers: HeaderMap,
    /// Response headers dropped before storing
    pub never_cache_headers: Vec<HeaderName>,
    /// Serve expired records while a refresh is pending
    pub use_stale: bool,
    /// Requests carrying a cookie with one of these name prefixes bypass the cache
    pub bypass_cookie_prefixes: Vec<String>,
    /// Cookie names that never cause a bypass
    pub never_bypass_cookies: Vec<String>,
    /// Emit Cache-Control and honor If-Modified-Since
    pub cache_control: bool,
    /// Generation lock TTL in seconds
    pub lock_ttl: u64,
    /// Store 3xx responses
    pub cache_redirects: bool,
    /// Query arguments left out of the fingerprint; a trailing `*` matches a prefix
    pub ignored_query_args: Vec<String>,
    /// Response header carrying the cache outcome
    pub status_header: HeaderName,
    /// Methods eligible for caching
    pub cacheable_methods: Vec<Method>,
}

impl Default for PageCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            times: 2,
            seconds: 120,
            max_age: 300,
            group: "page-cache".to_string(),
            variants: VariantRegistry::new(),
            static_headers: HeaderMap::new(),
            never_cache_headers: vec![TRANSFER_ENCODING],
            use_stale: true,
            bypass_cookie_prefixes: Vec::new(),
            never_bypass_cookies: Vec::new(),
            cache_control: true,
            lock_ttl: 10,
            cache_redirects: false,
            ignored_query_args: Vec::new(),
            status_header: HeaderName::from_static("x-cache"),
            cacheable_methods: vec![Method::GET, Method::HEAD],
        }
    }
}

impl PageCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a page once it is requested `times` times within `seconds`.
    ///
    /// `seconds < 1` or `times < 2` stores on the first request.
    pub fn sampling(mut self, times: u64, seconds: u64) -> Self {
        self.times = times;
        self.seconds = seconds;
        self
    }

    /// Disable sampling
    pub fn always_store(self) -> Self {
        self.sampling(0, 0)
    }

    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age = secs;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn variants(mut self, variants: VariantRegistry) -> Self {
        self.variants = variants;
        self
    }

    /// Add a header to every stored and served page
    pub fn static_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.static_headers.append(name, value);
        self
    }

    pub fn never_cache_header(mut self, name: HeaderName) -> Self {
        self.never_cache_headers.push(name);
        self
    }

    pub fn use_stale(mut self, enabled: bool) -> Self {
        self.use_stale = enabled;
        self
    }

    pub fn bypass_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.bypass_cookie_prefixes.push(prefix.into());
        self
    }

    pub fn never_bypass_cookie(mut self, name: impl Into<String>) -> Self {
        self.never_bypass_cookies.push(name.into());
        self
    }

    pub fn cache_control(mut self, enabled: bool) -> Self {
        self.cache_control = enabled;
        self
    }

    pub fn lock_ttl(mut self, secs: u64) -> Self {
        self.lock_ttl = secs;
        self
    }

    pub fn cache_redirects(mut self, enabled: bool) -> Self {
        self.cache_redirects = enabled;
        self
    }

    pub fn ignore_query_arg(mut self, name: impl Into<String>) -> Self {
        self.ignored_query_args.push(name.into());
        self
    }

    pub fn status_header(mut self, name: HeaderName) -> Self {
        self.status_header = name;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the sampling counter gates storage
    pub fn sampling_enabled(&self) -> bool {
        self.seconds >= 1 && self.times >= 2
    }

    /// Storage TTL for a record with the given freshness
    pub fn record_ttl(&self, max_age: u64) -> u64 {
        max_age.saturating_add(self.seconds).saturating_add(30)
    }

    /// The cookie that makes this request skip the cache, if any
    pub fn bypass_cookie<'a>(&self, cookies: impl IntoIterator<Item = &'a String>) -> Option<&'a str> {
        cookies
            .into_iter()
            .find(|name| {
                !self.never_bypass_cookies.contains(*name)
                    && self
                        .bypass_cookie_prefixes
                        .iter()
                        .any(|prefix| name.starts_with(prefix.as_str()))
            })
            .map(String::as_str)
    }
}
