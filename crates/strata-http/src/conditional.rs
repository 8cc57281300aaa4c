//! Conditional request handling and HTTP dates

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};

/// Whether a stored response can be answered with `304 Not Modified`.
///
/// `If-None-Match` wins when present. `If-Modified-Since` is only consulted
/// when `check_modified_since` is set.
pub fn is_not_modified(
    request: &HeaderMap,
    etag: Option<&str>,
    last_modified: Option<u64>,
    check_modified_since: bool,
) -> bool {
    if let Some(if_none_match) = request.get(IF_NONE_MATCH) {
        let (Ok(candidates), Some(etag)) = (if_none_match.to_str(), etag) else {
            return false;
        };
        return etag_matches(candidates, etag);
    }

    if !check_modified_since {
        return false;
    }

    let since = request
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    matches!((since, last_modified), (Some(since), Some(modified)) if modified <= since)
}

fn etag_matches(candidates: &str, etag: &str) -> bool {
    let etag = strip_weak(etag);
    candidates
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || strip_weak(candidate) == etag)
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Format epoch seconds as an IMF-fixdate
pub fn http_date(epoch: u64) -> String {
    let secs = i64::try_from(epoch).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse an HTTP date into epoch seconds
pub fn parse_http_date(value: &str) -> Option<u64> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .and_then(|date| u64::try_from(date.timestamp()).ok())
}
