//! Page cache outcomes

/// What the page cache decided for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    /// Sampling threshold not reached; rendered without storing
    MissTooEarly,
    /// No usable record; rendered and stored
    MissRender,
    /// Fresh record served
    HitFresh,
    /// Expired record served while this request does not refresh it
    HitStale,
    /// Expired record nominated for refresh by this request
    StaleRefresh,
    /// Record outdated by age or URL version; rendered and stored
    ExpiredRefresh,
    /// Caching skipped for this request
    Bypass,
    /// Remote store unavailable; rendered without caching
    Down,
}

impl PageState {
    /// Label sent in the cache-status response header
    pub fn as_str(&self) -> &'static str {
        match self {
            PageState::MissTooEarly => "IGNORED",
            PageState::MissRender => "MISS",
            PageState::HitFresh => "HIT",
            PageState::HitStale => "STALE",
            PageState::StaleRefresh => "REFRESH",
            PageState::ExpiredRefresh => "EXPIRED",
            PageState::Bypass => "BYPASS",
            PageState::Down => "DOWN",
        }
    }

    /// Whether a stored response is served
    pub fn is_hit(&self) -> bool {
        matches!(self, PageState::HitFresh | PageState::HitStale)
    }

    /// Whether this state wants to render and store a new record
    pub fn regenerates(&self) -> bool {
        matches!(
            self,
            PageState::MissRender | PageState::StaleRefresh | PageState::ExpiredRefresh
        )
    }
}
