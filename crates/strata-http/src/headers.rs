//! Response header assembly

use http::{HeaderMap, HeaderName, HeaderValue};

/// Merge response headers with the configured static set.
///
/// Names present in both keep the response values first, then the static
/// ones, without duplicates. The first value of each name replaces whatever
/// the target holds; the rest are appended.
pub fn do_headers(response: &HeaderMap, static_headers: &HeaderMap) -> HeaderMap {
    let mut merged = HeaderMap::with_capacity(response.keys_len() + static_headers.keys_len());

    let names = response
        .keys()
        .chain(static_headers.keys().filter(|name| !response.contains_key(*name)));
    for name in names {
        let mut values: Vec<&HeaderValue> = Vec::new();
        for value in response.get_all(name).iter().chain(static_headers.get_all(name)) {
            if !values.contains(&value) {
                values.push(value);
            }
        }
        emit(&mut merged, name, values);
    }

    merged
}

/// Write `values` under `name`: the first with clobber semantics, the rest
/// appended.
pub fn emit<'a>(target: &mut HeaderMap, name: &HeaderName, values: impl IntoIterator<Item = &'a HeaderValue>) {
    let mut values = values.into_iter();
    if let Some(first) = values.next() {
        target.insert(name.clone(), first.clone());
    }
    for value in values {
        target.append(name.clone(), value.clone());
    }
}
