//! Postcard-based value serialization with versioned envelopes.
//!
//! The cache contract stores opaque bytes; this module is the canonical way
//! for applications to turn typed values into those bytes and back. Every
//! encoded value is wrapped in a versioned envelope:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (4 bytes)│POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "SHRD"              u32                postcard::to_allocvec(T)
//! ```
//!
//! Magic and version are validated on every decode, so corrupted entries
//! and schema changes surface as typed errors and the entry can be evicted
//! rather than silently misread. Encoding is deterministic: the same value
//! always produces identical bytes, which is what makes the raw encoded
//! bytes usable as a compare-and-set token.
//!
//! Counters are the one exception: `incr`/`decr`/`incr_with_init` operate on
//! raw ASCII integers and must never go through this envelope, or the
//! server-side arithmetic would corrupt them.
//!
//! # Example
//!
//! ```rust
//! use shard_cache::serialization::{encode_value, decode_value};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Session { user: u64, csrf: String }
//!
//! # fn main() -> shard_cache::Result<()> {
//! let session = Session { user: 7, csrf: "tok".to_string() };
//! let bytes = encode_value(&session)?;
//! let back: Session = decode_value(&bytes)?;
//! assert_eq!(session, back);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Magic header for encoded cache values.
pub const CACHE_MAGIC: [u8; 4] = *b"SHRD";

/// Current schema version.
///
/// Increment when making breaking changes to cached types (fields added,
/// removed, reordered, or retyped). Entries written under an older version
/// fail decoding with [`Error::VersionMismatch`] and get evicted and
/// recomputed instead of being silently migrated.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope for encoded cache values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEnvelope<T> {
    /// Magic header: must be `b"SHRD"`
    pub magic: [u8; 4],
    /// Schema version: must match [`CURRENT_SCHEMA_VERSION`]
    pub version: u32,
    /// The actual cached data
    pub payload: T,
}

impl<T> CacheEnvelope<T> {
    /// Create a new envelope with the current magic and version.
    pub fn new(payload: T) -> Self {
        Self {
            magic: CACHE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value with its envelope for cache storage.
///
/// # Errors
/// Returns `Error::SerializationError` if Postcard serialization fails.
pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let envelope = CacheEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        log::error!("Cache value encoding failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode a value from cache storage, validating magic and version.
///
/// # Errors
/// - `Error::InvalidCacheEntry`: magic header mismatch
/// - `Error::VersionMismatch`: schema version changed
/// - `Error::DeserializationError`: corrupted payload
pub fn decode_value<'de, T: Deserialize<'de>>(bytes: &'de [u8]) -> Result<T> {
    let envelope: CacheEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        log::error!("Cache value decoding failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.magic != CACHE_MAGIC {
        log::warn!(
            "Invalid cache entry: expected magic {:?}, got {:?}",
            CACHE_MAGIC,
            envelope.magic
        );
        return Err(Error::InvalidCacheEntry(format!(
            "Invalid magic: expected {:?}, got {:?}",
            CACHE_MAGIC, envelope.magic
        )));
    }

    if envelope.version != CURRENT_SCHEMA_VERSION {
        log::warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION,
            envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct TestData {
        id: u64,
        name: String,
        active: bool,
    }

    fn sample() -> TestData {
        TestData {
            id: 123,
            name: "test".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_roundtrip() {
        let data = sample();
        let bytes = encode_value(&data).unwrap();
        let decoded: TestData = decode_value(&bytes).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn test_envelope_structure() {
        let data = sample();
        let bytes = encode_value(&data).unwrap();

        // Postcard uses variable-length encoding, so inspect the envelope by
        // decoding it rather than by byte offsets.
        let envelope: CacheEnvelope<TestData> = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(envelope.magic, CACHE_MAGIC);
        assert_eq!(envelope.version, CURRENT_SCHEMA_VERSION);
        assert_eq!(envelope.payload, data);
    }

    #[test]
    fn test_invalid_magic_rejected() {
        let mut envelope = CacheEnvelope::new(sample());
        envelope.magic = *b"XXXX";

        let bytes = postcard::to_allocvec(&envelope).unwrap();
        let result: Result<TestData> = decode_value(&bytes);
        match result.unwrap_err() {
            Error::InvalidCacheEntry(_) => {}
            e => panic!("Expected InvalidCacheEntry, got {:?}", e),
        }
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = CacheEnvelope::new(sample());
        envelope.version = 999;

        let bytes = postcard::to_allocvec(&envelope).unwrap();
        let result: Result<TestData> = decode_value(&bytes);
        match result.unwrap_err() {
            Error::VersionMismatch { expected, found } => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            e => panic!("Expected VersionMismatch, got {:?}", e),
        }
    }

    #[test]
    fn test_deterministic_encoding() {
        let data = sample();
        assert_eq!(encode_value(&data).unwrap(), encode_value(&data).unwrap());
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let mut bytes = encode_value(&sample()).unwrap();
        let len = bytes.len();
        bytes.truncate(len / 2);

        let result: Result<TestData> = decode_value(&bytes);
        match result.unwrap_err() {
            Error::DeserializationError(_) => {}
            e => panic!("Expected DeserializationError, got {:?}", e),
        }
    }
}
