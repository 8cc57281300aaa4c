//! Request fingerprints
//!
//! A page is identified by two hashes: the URL key (scheme, host and path)
//! which scopes version and variant bookkeeping for every variant of a URL,
//! and the page key which additionally covers method, normalized query and
//! the evaluated variant dimensions.

use std::collections::BTreeMap;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::RequestContext;

#[derive(Serialize)]
struct Fingerprint<'a> {
    method: &'a str,
    scheme: &'a str,
    host: &'a str,
    path: &'a str,
    query: &'a str,
    variants: &'a BTreeMap<String, String>,
}

/// Hash identifying every variant of one URL
pub fn url_key(scheme: &str, host: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scheme.as_bytes());
    hasher.update(b"://");
    hasher.update(host.to_ascii_lowercase().as_bytes());
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash identifying one stored page
pub fn page_key(
    request: &RequestContext,
    ignored_query_args: &[String],
    variants: &BTreeMap<String, String>,
) -> String {
    let query = normalize_query(request.query(), ignored_query_args);
    let fingerprint = Fingerprint {
        method: request.method().as_str(),
        scheme: request.scheme(),
        host: request.host(),
        path: request.path(),
        query: &query,
        variants,
    };

    // Serializing borrowed strings and a string map cannot fail
    let encoded = serde_json::to_vec(&fingerprint).unwrap_or_default();
    hex::encode(Sha256::digest(&encoded))
}

/// Sort query arguments and drop ignored ones.
///
/// An ignored name ending in `*` matches every argument with that prefix.
pub fn normalize_query(query: Option<&str>, ignored: &[String]) -> String {
    let Some(query) = query else {
        return String::new();
    };

    let mut args: Vec<(&str, &str)> = query
        .split('&')
        .filter(|arg| !arg.is_empty())
        .map(|arg| arg.split_once('=').unwrap_or((arg, "")))
        .filter(|(name, _)| !is_ignored(name, ignored))
        .collect();
    args.sort();

    args.iter()
        .map(|(name, value)| {
            if value.is_empty() {
                name.to_string()
            } else {
                format!("{name}={value}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn is_ignored(name: &str, ignored: &[String]) -> bool {
    ignored.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    })
}
