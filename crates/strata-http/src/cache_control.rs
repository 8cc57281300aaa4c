use std::time::Duration;

use http::HeaderMap;
use http::header::CACHE_CONTROL;

/// Cache-Control directives of a rendered response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// Max age in seconds
    pub max_age: Option<Duration>,
    /// No-cache directive
    pub no_cache: bool,
    /// No-store directive
    pub no_store: bool,
    /// Private directive
    pub private: bool,
    /// Public directive
    pub public: bool,
    /// Must-revalidate directive
    pub must_revalidate: bool,
}

impl CacheControl {
    /// Parse one header value
    pub fn parse(header: &str) -> Self {
        let mut cc = Self::default();
        cc.merge(header);
        cc
    }

    /// Combine every Cache-Control header of a response
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cc = Self::default();
        for value in headers.get_all(CACHE_CONTROL) {
            if let Ok(value) = value.to_str() {
                cc.merge(value);
            }
        }
        cc
    }

    /// Whether a shared cache may keep the response
    pub fn is_storable(&self) -> bool {
        !self.no_store && !self.private
    }

    fn merge(&mut self, header: &str) {
        for directive in header.split(',') {
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                None => (directive.trim(), None),
            };

            match name.to_ascii_lowercase().as_str() {
                "no-cache" => self.no_cache = true,
                "no-store" => self.no_store = true,
                "private" => self.private = true,
                "public" => self.public = true,
                "must-revalidate" => self.must_revalidate = true,
                "max-age" => {
                    if let Some(secs) = value.and_then(|v| v.parse::<u64>().ok()) {
                        self.max_age = Some(Duration::from_secs(secs));
                    }
                }
                _ => {}
            }
        }
    }
}
