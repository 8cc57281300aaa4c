use std::collections::BTreeSet;

use http::header::{CACHE_CONTROL, LAST_MODIFIED, SET_COOKIE};
use tracing::{debug, warn};

use strata::{CacheMetrics, KvStore, PageState};

use super::pending::Target;
use super::{PageCacheEngine, PageResponse, PendingRender, insert_text, vary_key, version_key};
use crate::cache_control::CacheControl;
use crate::conditional::http_date;
use crate::headers::do_headers;
use crate::{PageRecord, RequestContext, fingerprint};

impl<S, M> PageCacheEngine<S, M>
where
    S: KvStore,
    M: CacheMetrics,
{
    /// Store the rendered response if this render holds the generation lock
    /// and the response is safe to share, then return it to the client.
    ///
    /// The lock is released on every path.
    pub async fn capture(&self, mut pending: PendingRender, mut response: PageResponse) -> PageResponse {
        let Some(lock) = pending.lock.take() else {
            let state = match pending.state {
                PageState::Down => PageState::Down,
                _ if is_unshareable(&pending, &response) => PageState::Bypass,
                state => state,
            };
            return self.label(response, state);
        };

        let stored = self.store(&pending, &response).await;
        self.release(&lock).await;

        match stored {
            Some(record) => {
                if self.config.cache_control && !response.headers.contains_key(CACHE_CONTROL) {
                    let value = format!("max-age={}, must-revalidate", record.max_age);
                    insert_text(&mut response.headers, CACHE_CONTROL, &value);
                }
                if !response.headers.contains_key(LAST_MODIFIED) {
                    insert_text(&mut response.headers, LAST_MODIFIED, &http_date(record.rendered_at));
                }
                response.headers = do_headers(&response.headers, &self.config.static_headers);
                self.label(response, pending.state)
            }
            None => {
                self.cache.metrics().record_page(PageState::Bypass);
                self.label(response, PageState::Bypass)
            }
        }
    }

    /// Give up on a render that will never be captured
    pub async fn abandon(&self, mut pending: PendingRender) {
        if let Some(lock) = pending.lock.take() {
            self.release(&lock).await;
        }
    }

    /// Invalidate every variant of a URL by bumping its version.
    ///
    /// Returns the new version, or `None` if the store could not be updated.
    pub async fn invalidate_url(&self, scheme: &str, host: &str, path: &str) -> Option<i64> {
        let key = version_key(&fingerprint::url_key(scheme, host, path));
        let group = self.config.group.as_str();

        self.cache.add(key.as_str(), &0i64, group, 0).await;
        let version = self.cache.incr(key.as_str(), 1, group).await;
        debug!(target: "strata", host, path, version = ?version, "url invalidated");
        version
    }

    /// Persist the response, returning the stored record
    async fn store(&self, pending: &PendingRender, response: &PageResponse) -> Option<PageRecord> {
        let target = pending.target.as_ref()?;
        let status = response.status;

        if pending.cancelled || status.is_server_error() {
            debug!(
                target: "strata",
                cancelled = pending.cancelled,
                status = status.as_u16(),
                "response not stored"
            );
            return None;
        }

        let key = self
            .finalize_variants(target, &pending.activated, &pending.request)
            .await;

        let cache_control = CacheControl::from_headers(&response.headers);
        let redirect = status.is_redirection();
        let skip = if response.headers.contains_key(SET_COOKIE) {
            Some("set-cookie")
        } else if !cache_control.is_storable() {
            Some("cache-control")
        } else if redirect && !self.config.cache_redirects {
            Some("redirect")
        } else if response.body.is_empty() && !redirect {
            Some("empty body")
        } else {
            None
        };
        if let Some(reason) = skip {
            debug!(target: "strata", reason, status = status.as_u16(), "response not stored");
            return None;
        }

        let mut headers = response.headers.clone();
        for name in &self.config.never_cache_headers {
            headers.remove(name);
        }

        let max_age = cache_control
            .max_age
            .map(|age| age.as_secs())
            .unwrap_or(self.config.max_age);
        let record = PageRecord::from_response(
            target.url_version,
            self.clock.now(),
            status,
            &headers,
            &response.body,
            max_age,
        );

        let ttl = self.config.record_ttl(max_age);
        if !self
            .cache
            .set(key.as_str(), &record, &self.config.group, ttl)
            .await
        {
            warn!(target: "strata", key = %key, "page record could not be stored");
            return None;
        }
        Some(record)
    }

    /// Remember the optional dimensions active for the URL and return the
    /// page key they produce.
    async fn finalize_variants(
        &self,
        target: &Target,
        activated: &BTreeSet<String>,
        request: &RequestContext,
    ) -> String {
        let registry = &self.config.variants;
        for name in activated.iter().filter(|name| !registry.is_optional(name)) {
            warn!(target: "strata", dimension = %name, "not an optional variant; ignored");
        }

        let optional: BTreeSet<String> = target
            .persisted
            .iter()
            .chain(activated)
            .filter(|name| registry.is_optional(name))
            .cloned()
            .collect();
        if optional != target.persisted {
            let ttl = self.config.record_ttl(self.config.max_age);
            self.cache
                .set(vary_key(&target.url_key), &optional, &self.config.group, ttl)
                .await;
        }

        let active = registry.active(&optional);
        if active == target.active {
            return target.key.clone();
        }
        let variants = registry.evaluate(&active, request);
        fingerprint::page_key(request, &self.config.ignored_query_args, &variants)
    }

    async fn release(&self, lock: &str) {
        self.cache.delete(lock, &self.config.group).await;
    }
}

/// Responses that must never be shared, whoever renders them
fn is_unshareable(pending: &PendingRender, response: &PageResponse) -> bool {
    pending.cancelled
        || response.status.is_server_error()
        || response.headers.contains_key(SET_COOKIE)
}
