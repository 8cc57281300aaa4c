//! strata-core: Core traits and types for the strata cache
//!
//! This crate provides the pieces shared by every other strata crate: the
//! [`KvStore`] capability the object cache talks to, key derivation
//! ([`KeyCodec`]), the tagged value encoding ([`ValueCodec`]), metrics hooks
//! and the error type.

mod clock;
mod codec;
mod error;
mod keys;
mod traits;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Encoding, ValueCodec};
pub use error::{CacheError, Result};
pub use keys::{normalize_group, CacheKey, KeyCodec, DEFAULT_GROUP};
pub use traits::*;
pub use types::*;
