use std::collections::BTreeSet;

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use tracing::warn;

use strata::PageState;

use crate::RequestContext;

/// A response passing through the page cache
#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PageResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// `200 OK` with an HTML body
    pub fn html(body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        Self::new(StatusCode::OK, headers, body)
    }

    /// Add a header, keeping existing values
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Value of the cache-status header, if set
    pub fn cache_status(&self, header: &HeaderName) -> Option<&str> {
        self.headers.get(header).and_then(|v| v.to_str().ok())
    }

    pub fn into_response(self) -> Response<Bytes> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    pub fn from_response(response: Response<Bytes>) -> Self {
        let (parts, body) = response.into_parts();
        Self::new(parts.status, parts.headers, body)
    }
}

/// Where a captured page will be stored
#[derive(Debug, Clone)]
pub(super) struct Target {
    pub(super) url_key: String,
    pub(super) url_version: i64,
    pub(super) key: String,
    /// Optional dimensions already remembered for the URL
    pub(super) persisted: BTreeSet<String>,
    /// Dimensions the lookup key was computed from
    pub(super) active: BTreeSet<String>,
}

/// A request the host has to render.
///
/// Hand the rendered response to
/// [`PageCacheEngine::capture`](super::PageCacheEngine::capture), or call
/// [`PageCacheEngine::abandon`](super::PageCacheEngine::abandon) if rendering
/// never completes. Either one releases the generation lock.
#[derive(Debug)]
pub struct PendingRender {
    pub(super) state: PageState,
    pub(super) request: RequestContext,
    pub(super) target: Option<Target>,
    pub(super) lock: Option<String>,
    pub(super) activated: BTreeSet<String>,
    pub(super) cancelled: bool,
}

impl PendingRender {
    pub(super) fn uncached(state: PageState, request: &RequestContext) -> Self {
        Self {
            state,
            request: request.clone(),
            target: None,
            lock: None,
            activated: BTreeSet::new(),
            cancelled: false,
        }
    }

    pub(super) fn targeted(state: PageState, request: &RequestContext, target: Target) -> Self {
        let mut pending = Self::uncached(state, request);
        pending.target = Some(target);
        pending
    }

    /// What the lookup decided
    pub fn state(&self) -> PageState {
        self.state
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Page key computed at lookup
    pub fn key(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.key.as_str())
    }

    /// Whether this render holds the generation lock and will be stored
    pub fn holds_lock(&self) -> bool {
        self.lock.is_some()
    }

    /// Keep the rendered response out of the cache
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Activate an optional variant dimension for this URL
    pub fn vary_on(&mut self, dimension: impl Into<String>) {
        self.activated.insert(dimension.into());
    }
}

impl Drop for PendingRender {
    fn drop(&mut self) {
        if let Some(lock) = &self.lock {
            warn!(
                target: "strata",
                lock = %lock,
                "render dropped without capture; generation lock held until it expires"
            );
        }
    }
}
