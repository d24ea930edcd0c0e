//! The cache operation contract.

use crate::expiry::Expiry;
use crate::tracker::{ErrorKind, WatchHandle};
use std::collections::HashMap;

/// Opaque compare-and-set token.
///
/// Returned by [`CacheClient::get_with_token`] and consumed by at most one
/// subsequent [`CacheClient::compare_and_set`] call. It captures "the value
/// as last observed"; a distinct type so it cannot be confused with a plain
/// value at compile time, and deliberately not otherwise interpretable.
#[derive(Clone, Debug)]
pub struct CasToken(pub(crate) Vec<u8>);

impl CasToken {
    pub(crate) fn matches(&self, observed: &[u8]) -> bool {
        self.0 == observed
    }
}

/// Trait for sharded key-value cache clients.
///
/// Values are opaque bytes; keys are opaque strings stable across processes.
/// Counter operations (`incr`, `decr`, `incr_with_init`) work on values that
/// are ASCII decimal integers, stored raw so the server's atomic arithmetic
/// applies to them; never envelope-encode a counter.
///
/// **IMPORTANT:** No method returns a `Result`. Transport and protocol
/// failures are absorbed at this boundary: the operation returns its failure
/// sentinel (`false`, `None`, or an empty/partial map) and records the most
/// specific [`ErrorKind`] in the client's error tracker. The cache is a
/// best-effort accelerator, never a source of truth, so a miss and an outage
/// look the same to code that doesn't ask. Callers that need to tell them
/// apart capture a watch point with [`mark`] and check
/// [`has_error_since`] after the span of calls.
///
/// All methods use `&self`; implementations use interior mutability and are
/// `Clone` for cheap sharing across tasks.
///
/// [`mark`]: CacheClient::mark
/// [`has_error_since`]: CacheClient::has_error_since
#[allow(async_fn_in_trait)]
pub trait CacheClient: Send + Sync + Clone {
    /// Fetch a value.
    ///
    /// `None` means "not found" *or* "cache unreachable"; consult the
    /// tracker to distinguish.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Fetch a value together with a compare-and-set token for it.
    async fn get_with_token(&self, key: &str) -> Option<(Vec<u8>, CasToken)>;

    /// Store a value.
    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool;

    /// Store a value only if the key does not already exist.
    ///
    /// "Already exists" is a negative-but-valid outcome, not an error; use
    /// it for mutual-exclusion-style initialization.
    async fn add(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool;

    /// Store a value only if the stored value still matches `token`.
    ///
    /// Fails without side effects on a mismatch (lost-update prevention).
    async fn compare_and_set(
        &self,
        token: CasToken,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> bool;

    /// Delete a key. Idempotent: `true` even if the key was absent.
    async fn delete(&self, key: &str) -> bool;

    /// Fetch many keys; the result holds present keys only.
    ///
    /// Keys are grouped by destination server and each group is issued as
    /// one pipelined round trip. A server-level failure drops that server's
    /// keys from the result without aborting the other groups.
    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Vec<u8>>;

    /// Store many values with one expiry, grouped and pipelined per server.
    ///
    /// `true` only if every server's batch succeeded; a failed server never
    /// stops the remaining batches from being attempted.
    async fn set_multi(&self, values: HashMap<String, Vec<u8>>, expiry: Expiry) -> bool;

    /// Delete many keys, grouped and pipelined per server.
    async fn delete_multi(&self, keys: &[String]) -> bool;

    /// Change a key's expiration without touching its value.
    ///
    /// `true` when the key exists and the new expiration was applied.
    async fn change_ttl(&self, key: &str, expiry: Expiry) -> bool;

    /// Change many keys' expiration, grouped and pipelined per server.
    async fn change_ttl_multi(&self, keys: &[String], expiry: Expiry) -> bool;

    /// Atomically increment an existing counter by `delta`.
    ///
    /// Returns the new value, or `None` if the key does not currently
    /// exist; incrementing a missing key is a no-op failure, not "create
    /// at delta".
    async fn incr(&self, key: &str, delta: u64) -> Option<i64>;

    /// Atomically decrement an existing counter by `delta`.
    async fn decr(&self, key: &str, delta: u64) -> Option<i64>;

    /// Increment a counter, initializing it if missing.
    ///
    /// If the key is absent it ends up holding `init`; if present it ends up
    /// incremented by `step`. Concurrent callers racing on a fresh key
    /// converge to the same total as any serial order (no lost updates on
    /// backends with atomic set-if-absent + increment primitives; see the
    /// backend docs for exceptions). Returns the resulting counter value.
    async fn incr_with_init(&self, key: &str, expiry: Expiry, step: u64, init: u64)
        -> Option<i64>;

    /// Capture a watch point into the client's error sequence.
    fn mark(&self) -> WatchHandle;

    /// Whether any operation recorded an error after `watch` was captured.
    fn has_error_since(&self, watch: &WatchHandle) -> bool;

    /// The most recently recorded error kind, or [`ErrorKind::None`].
    fn last_error(&self) -> ErrorKind;

    /// Reset the last-error kind.
    fn clear_last_error(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cas_token_matches_raw_bytes() {
        let token = CasToken(b"observed".to_vec());
        assert!(token.matches(b"observed"));
        assert!(!token.matches(b"changed"));
    }
}
