//! Adaptive page cache
//!
//! For every request the engine either serves a stored page or hands the
//! request back for rendering, possibly holding the generation lock so the
//! rendered response is stored on capture. Pages are only stored once they
//! prove popular: a per-page counter must reach `times` within `seconds`.
//!
//! Bookkeeping keys, all in the configured group:
//!
//! | Key | Holds |
//! |-----|-------|
//! | `<page>` | [`PageRecord`] |
//! | `<url>_reqs` | sampling counter |
//! | `<url>_genlock` | generation lock |
//! | `<url>_version` | URL version |
//! | `<url>_vary` | optional variant dimensions active for the URL |

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CACHE_CONTROL, ETAG, LAST_MODIFIED};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use tracing::debug;

use strata::{CacheMetrics, Clock, KvStore, NoopMetrics, ObjectCache, PageState, SystemClock};

use crate::conditional::{http_date, is_not_modified, parse_http_date};
use crate::headers::do_headers;
use crate::{PageCacheConfig, PageRecord, RequestContext, fingerprint};

mod capture;
mod pending;

pub use pending::{PageResponse, PendingRender};
use pending::Target;

fn counter_key(url_key: &str) -> String {
    format!("{url_key}_reqs")
}

fn lock_key(url_key: &str) -> String {
    format!("{url_key}_genlock")
}

fn version_key(url_key: &str) -> String {
    format!("{url_key}_version")
}

fn vary_key(url_key: &str) -> String {
    format!("{url_key}_vary")
}

/// Outcome of [`PageCacheEngine::lookup`]
#[derive(Debug)]
pub enum Lookup {
    /// Serve this stored response
    Cached(PageResponse),
    /// Render the page, then capture or abandon it
    Render(PendingRender),
}

/// Page cache decision engine for one request.
///
/// The engine owns the request's [`ObjectCache`]; build a new one (with a new
/// object cache) per request.
pub struct PageCacheEngine<S, M = NoopMetrics>
where
    S: KvStore,
    M: CacheMetrics,
{
    cache: ObjectCache<S, M>,
    config: Arc<PageCacheConfig>,
    clock: Arc<dyn Clock>,
}

impl<S, M> PageCacheEngine<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    pub fn new(cache: ObjectCache<S, M>, config: Arc<PageCacheConfig>) -> Self {
        Self::with_clock(cache, config, SystemClock)
    }

    /// Create an engine that reads record ages from `clock`
    pub fn with_clock(cache: ObjectCache<S, M>, config: Arc<PageCacheConfig>, clock: impl Clock) -> Self {
        Self {
            cache,
            config,
            clock: Arc::new(clock),
        }
    }

    /// The object cache backing this engine
    pub fn cache(&self) -> &ObjectCache<S, M> {
        &self.cache
    }

    pub fn config(&self) -> &PageCacheConfig {
        &self.config
    }

    /// Decide how to answer `request`
    pub async fn lookup(&self, request: &RequestContext) -> Lookup {
        if let Some(reason) = self.bypass_reason(request) {
            debug!(target: "strata", reason, path = request.path(), "page cache bypassed");
            return self.render(PendingRender::uncached(PageState::Bypass, request));
        }
        if !self.cache.is_connected() {
            return self.render(PendingRender::uncached(PageState::Down, request));
        }

        let group = self.config.group.as_str();
        let url_key = fingerprint::url_key(request.scheme(), request.host(), request.path());
        let url_version = self
            .cache
            .get_fresh::<i64>(version_key(&url_key), group)
            .await
            .unwrap_or(0);
        let persisted = self
            .cache
            .get_fresh::<BTreeSet<String>>(vary_key(&url_key), group)
            .await
            .unwrap_or_default();

        let registry = &self.config.variants;
        let active = registry.active(&persisted);
        let variants = registry.evaluate(&active, request);
        let key = fingerprint::page_key(request, &self.config.ignored_query_args, &variants);

        let record = self.cache.get_fresh::<PageRecord>(key.as_str(), group).await;
        let now = self.clock.now();
        let state = self.decide(&url_key, record.as_ref(), url_version, now).await;

        if !self.cache.is_connected() {
            return self.render(PendingRender::uncached(PageState::Down, request));
        }
        debug!(target: "strata", state = state.as_str(), key = %key, "page cache decision");

        if state.is_hit() {
            if let Some(record) = &record {
                return self.serve(record, state, request, now);
            }
        }

        let lock = lock_key(&url_key);
        let target = Target {
            url_key,
            url_version,
            key,
            persisted,
            active,
        };
        let mut pending = PendingRender::targeted(state, request, target);
        if !state.regenerates() {
            return self.render(pending);
        }

        let token = format!("{:016x}", rand::random::<u64>());
        if self
            .cache
            .add(lock.as_str(), &token, group, self.config.lock_ttl)
            .await
        {
            pending.lock = Some(lock);
            return self.render(pending);
        }

        match record {
            Some(record) if record.is_fresh(now) => {
                debug!(target: "strata", key = %lock, "regeneration in flight; serving cached");
                self.serve(&record, PageState::HitFresh, request, now)
            }
            Some(record) if self.config.use_stale => {
                debug!(target: "strata", key = %lock, "regeneration in flight; serving stale");
                self.serve(&record, PageState::HitStale, request, now)
            }
            _ => self.render(pending),
        }
    }

    /// Why `request` skips the cache, if it does
    fn bypass_reason(&self, request: &RequestContext) -> Option<&'static str> {
        let config = &self.config;
        if !config.enabled || config.max_age < 1 {
            return Some("disabled");
        }
        if !config.cacheable_methods.contains(request.method()) {
            return Some("method");
        }
        if config.bypass_cookie(request.cookies().keys()).is_some() {
            return Some("cookie");
        }
        None
    }

    async fn decide(
        &self,
        url_key: &str,
        record: Option<&PageRecord>,
        url_version: i64,
        now: u64,
    ) -> PageState {
        let config = &self.config;
        if record.is_some_and(|r| r.url_version != url_version) {
            return PageState::ExpiredRefresh;
        }

        if !config.sampling_enabled() {
            return match record {
                Some(r) if r.is_fresh(now) => PageState::HitFresh,
                Some(_) if config.use_stale => PageState::StaleRefresh,
                _ => PageState::MissRender,
            };
        }

        if let Some(r) = record {
            if r.is_fresh(now) && r.age(now) < r.max_age.saturating_sub(config.seconds) {
                return PageState::HitFresh;
            }
        }

        let group = config.group.as_str();
        let counter = counter_key(url_key);
        self.cache
            .add(counter.as_str(), &0i64, group, config.seconds)
            .await;
        let count = self
            .cache
            .incr(counter.as_str(), 1, group)
            .await
            .unwrap_or_default();
        let threshold = i64::try_from(config.times).unwrap_or(i64::MAX);

        if count >= threshold {
            self.cache.delete(counter.as_str(), group).await;
            match record {
                Some(r) if !r.is_fresh(now) => PageState::ExpiredRefresh,
                _ => PageState::MissRender,
            }
        } else {
            match record {
                Some(r) if r.is_fresh(now) => PageState::HitFresh,
                Some(_) if config.use_stale => PageState::HitStale,
                _ => PageState::MissTooEarly,
            }
        }
    }

    /// Build the response for a stored record
    fn serve(
        &self,
        record: &PageRecord,
        state: PageState,
        request: &RequestContext,
        now: u64,
    ) -> Lookup {
        self.cache.metrics().record_page(state);

        let mut headers = record.header_map();
        let last_modified = record
            .last_modified()
            .and_then(parse_http_date)
            .unwrap_or(record.rendered_at);
        if !headers.contains_key(LAST_MODIFIED) {
            insert_text(&mut headers, LAST_MODIFIED, &http_date(record.rendered_at));
        }
        if self.config.cache_control {
            let value = format!("max-age={}, must-revalidate", record.remaining(now));
            insert_text(&mut headers, CACHE_CONTROL, &value);
        }

        if is_not_modified(
            request.headers(),
            record.etag(),
            Some(last_modified),
            self.config.cache_control,
        ) {
            let mut validators = HeaderMap::new();
            for name in [ETAG, LAST_MODIFIED, CACHE_CONTROL] {
                if let Some(value) = headers.get(&name) {
                    validators.insert(name, value.clone());
                }
            }
            let response = PageResponse::new(StatusCode::NOT_MODIFIED, validators, Bytes::new());
            return Lookup::Cached(self.label(response, PageState::HitFresh));
        }

        let body = if request.method() == Method::HEAD {
            Bytes::new()
        } else {
            record.body_bytes()
        };
        let headers = do_headers(&headers, &self.config.static_headers);
        let response = PageResponse::new(record.status_code(), headers, body);
        Lookup::Cached(self.label(response, state))
    }

    fn render(&self, pending: PendingRender) -> Lookup {
        self.cache.metrics().record_page(pending.state);
        Lookup::Render(pending)
    }

    /// Set the cache-status header
    fn label(&self, mut response: PageResponse, state: PageState) -> PageResponse {
        response.headers.insert(
            self.config.status_header.clone(),
            HeaderValue::from_static(state.as_str()),
        );
        response
    }
}

fn insert_text(headers: &mut HeaderMap, name: http::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
