use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use parking_lot::Mutex;

use strata_http::PendingRender;

/// Directives a handler gives the page cache about its own response.
///
/// Outside [`PageCacheLayer`](crate::PageCacheLayer) the directives go nowhere.
#[derive(Debug, Clone, Default)]
pub struct PageControl {
    directives: Arc<Mutex<Directives>>,
}

#[derive(Debug, Default)]
struct Directives {
    cancelled: bool,
    vary_on: BTreeSet<String>,
}

impl PageControl {
    /// Keep this response out of the page cache
    pub fn cancel(&self) {
        self.directives.lock().cancelled = true;
    }

    /// Activate an optional variant dimension for this URL
    pub fn vary_on(&self, dimension: impl Into<String>) {
        self.directives.lock().vary_on.insert(dimension.into());
    }

    pub fn is_cancelled(&self) -> bool {
        self.directives.lock().cancelled
    }

    pub(crate) fn apply(&self, pending: &mut PendingRender) {
        let directives = self.directives.lock();
        if directives.cancelled {
            pending.cancel();
        }
        for dimension in &directives.vary_on {
            pending.vary_on(dimension.clone());
        }
    }
}

impl<State> FromRequestParts<State> for PageControl
where
    State: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &State) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<PageControl>().cloned().unwrap_or_default())
    }
}
