//! Stored page records

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{ETAG, LAST_MODIFIED};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A stored header value.
///
/// Text values are kept as JSON strings; values with bytes outside visible
/// ASCII are kept as base64 so they replay unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderBytes {
    Text(String),
    Raw {
        #[serde(serialize_with = "encode_body", deserialize_with = "decode_body")]
        base64: Vec<u8>,
    },
}

impl HeaderBytes {
    fn from_value(value: &HeaderValue) -> Self {
        match value.to_str() {
            Ok(text) => Self::Text(text.to_string()),
            Err(_) => Self::Raw {
                base64: value.as_bytes().to_vec(),
            },
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Raw { .. } => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw { base64 } => base64,
        }
    }
}

/// A rendered response as kept in the page-cache group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// URL version current when the page was rendered
    pub url_version: i64,
    /// Render time, seconds since the epoch
    pub rendered_at: u64,
    pub status: u16,
    /// Lowercase header name to values, in emission order
    pub headers: BTreeMap<String, Vec<HeaderBytes>>,
    #[serde(serialize_with = "encode_body", deserialize_with = "decode_body")]
    pub body: Vec<u8>,
    /// Seconds the record may be served as fresh; 0 never serves
    pub max_age: u64,
}

impl PageRecord {
    /// Capture a response
    pub fn from_response(
        url_version: i64,
        rendered_at: u64,
        status: StatusCode,
        headers: &HeaderMap,
        body: &[u8],
        max_age: u64,
    ) -> Self {
        let mut stored: BTreeMap<String, Vec<HeaderBytes>> = BTreeMap::new();
        for (name, value) in headers {
            stored
                .entry(name.as_str().to_string())
                .or_default()
                .push(HeaderBytes::from_value(value));
        }

        Self {
            url_version,
            rendered_at,
            status: status.as_u16(),
            headers: stored,
            body: body.to_vec(),
            max_age,
        }
    }

    /// Seconds since the render
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.rendered_at)
    }

    /// Whether the record may be served as fresh at `now`
    pub fn is_fresh(&self, now: u64) -> bool {
        self.max_age > 0 && self.age(now) < self.max_age
    }

    /// Seconds of freshness left
    pub fn remaining(&self, now: u64) -> u64 {
        self.max_age.saturating_sub(self.age(now))
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|values| values.first())
            .and_then(HeaderBytes::as_str)
    }

    pub fn etag(&self) -> Option<&str> {
        self.header(ETAG.as_str())
    }

    pub fn last_modified(&self) -> Option<&str> {
        self.header(LAST_MODIFIED.as_str())
    }

    /// Stored headers as a header map, preserving multi-valued headers
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, values) in &self.headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                    map.append(name.clone(), value);
                }
            }
        }
        map
    }

    pub fn body_bytes(&self) -> Bytes {
        Bytes::from(self.body.clone())
    }
}

fn encode_body<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(body))
}

fn decode_body<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD.decode(encoded).map_err(serde::de::Error::custom)
}
