//! Tagged value encoding
//!
//! Every stored value carries its format, fixed at write time:
//!
//! | Form | Layout |
//! |------|--------|
//! | integer | bare decimal text, e.g. `42` or `-7` |
//! | raw bytes | `0x01` followed by the payload |
//! | structured | `0x02` followed by JSON |
//!
//! Integers stay untagged so the remote store can increment them in place.
//! The tag bytes are never ASCII digits or `-`, so the three forms cannot be
//! confused.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{CacheError, Result};

const TAG_BYTES: u8 = 0x01;
const TAG_JSON: u8 = 0x02;

/// Storage form of an encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Bare decimal integer
    Integer,
    /// Opaque bytes
    Bytes,
    /// JSON document
    Json,
}

/// Encoder and decoder for stored values
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueCodec;

impl ValueCodec {
    /// Encode a serializable value.
    ///
    /// Values whose JSON form is an integer are stored as bare integers.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        let json =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        if parse_integer(&json).is_some() {
            return Ok(json);
        }
        Ok(tagged(TAG_JSON, &json))
    }

    /// Encode an integer
    pub fn encode_int(value: i64) -> Vec<u8> {
        value.to_string().into_bytes()
    }

    /// Encode opaque bytes
    pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
        tagged(TAG_BYTES, bytes)
    }

    /// Identify the storage form of `bytes`, or `None` if they were not
    /// produced by this codec.
    pub fn encoding(bytes: &[u8]) -> Option<Encoding> {
        match bytes.first()? {
            &TAG_BYTES => Some(Encoding::Bytes),
            &TAG_JSON => Some(Encoding::Json),
            _ => parse_integer(bytes).map(|_| Encoding::Integer),
        }
    }

    /// Cheap check whether `bytes` already carry an encoding
    pub fn is_encoded(bytes: &[u8]) -> bool {
        Self::encoding(bytes).is_some()
    }

    /// Decode a structured or integer value
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        let payload = match Self::encoding(bytes) {
            Some(Encoding::Integer) => bytes,
            Some(Encoding::Json) => &bytes[1..],
            Some(Encoding::Bytes) => {
                return Err(CacheError::Deserialization(
                    "raw bytes cannot be decoded as a structured value".to_string(),
                ));
            }
            None => {
                return Err(CacheError::Deserialization(
                    "unrecognized value encoding".to_string(),
                ));
            }
        };
        serde_json::from_slice(payload).map_err(|e| CacheError::Deserialization(e.to_string()))
    }

    /// Decode an integer value
    pub fn decode_int(bytes: &[u8]) -> Result<i64> {
        parse_integer(bytes)
            .ok_or_else(|| CacheError::Deserialization("value is not an integer".to_string()))
    }

    /// Decode opaque bytes
    pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<u8>> {
        match Self::encoding(bytes) {
            Some(Encoding::Bytes) => Ok(bytes[1..].to_vec()),
            _ => Err(CacheError::Deserialization(
                "value is not a raw byte payload".to_string(),
            )),
        }
    }
}

fn tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

fn parse_integer(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
