//! Error types for the cache client.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache client.
///
/// Internal plumbing returns `Result<T>`; the public [`CacheClient`]
/// operations never do. Failures are converted to sentinel return values at
/// the operation boundary, and the most specific variant is recorded in the
/// [`ErrorTracker`] so callers can tell "legitimately absent" from "could not
/// reach the cache".
///
/// [`CacheClient`]: crate::client::CacheClient
/// [`ErrorTracker`]: crate::tracker::ErrorTracker
#[derive(Debug, Clone)]
pub enum Error {
    /// No candidate server could be connected to for a key.
    ///
    /// Raised when every candidate in the selector's ordering was tried and
    /// none yielded a usable connection, or automatic failover is disabled
    /// and the sole pinned server is down.
    Unreachable(String),

    /// A transport or protocol exception occurred mid-operation.
    ///
    /// Common causes:
    /// - Connection reset while a command was in flight
    /// - Malformed reply from the server
    /// - Read/write timeout
    ///
    /// The offending connection is discarded from the pool before this is
    /// recorded, so the next request reconnects or fails over.
    Unexpected(String),

    /// Serialization failed when converting a value to cache bytes.
    SerializationError(String),

    /// Deserialization failed when converting cache bytes to a value.
    ///
    /// Indicates corrupted or malformed data in the cache. The entry should
    /// be evicted and recomputed.
    DeserializationError(String),

    /// Invalid cache entry: corrupted envelope or bad magic.
    ///
    /// Returned when the envelope header is not `b"SHRD"` or the envelope
    /// itself fails to decode. The entry should be evicted.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    ///
    /// Expected during deployments that change cached types; the entry is
    /// evicted and recomputed on next access.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from the cached entry)
        found: u32,
    },

    /// Configuration error during construction.
    ///
    /// Common causes:
    /// - Empty server list
    /// - Duplicate or empty server tags
    /// - Invalid server address
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Unreachable(msg) => write!(f, "No usable server: {}", msg),
            Error::Unexpected(msg) => write!(f, "Unexpected cache error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::Unexpected(e.to_string())
        } else if e.is_syntax() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Unexpected(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Unexpected(format!("Redis error: {}", e))
    }
}
