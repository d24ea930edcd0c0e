//! Metrics boundary for cache operations.
//!
//! Backends emit one observation per operation: value-bearing operations
//! report payload sizes, everything else a bare count, keyed by cache key.
//! Implement [`MetricsSink`] to forward these into your monitoring system:
//!
//! ```ignore
//! use shard_cache::observability::MetricsSink;
//!
//! struct PrometheusSink;
//!
//! impl MetricsSink for PrometheusSink {
//!     fn record_bytes(&self, op: &'static str, _key: &str, bytes_in: u64, bytes_out: u64) {
//!         // counter!("cache_bytes_in", "op" => op).increment(bytes_in);
//!         // counter!("cache_bytes_out", "op" => op).increment(bytes_out);
//!     }
//!     fn record_call(&self, op: &'static str, _key: &str) {
//!         // counter!("cache_calls", "op" => op).increment(1);
//!     }
//! }
//!
//! // let cache = RedisCluster::new(config).await?
//! //     .with_metrics(Box::new(PrometheusSink));
//! ```
//!
//! Default method bodies log via the `log` crate; [`NoOpMetrics`] discards
//! everything.

/// Trait for per-operation cache metrics collection.
pub trait MetricsSink: Send + Sync {
    /// Record an operation that moved value bytes.
    ///
    /// `bytes_in` counts bytes received from the server (reads), `bytes_out`
    /// bytes sent to it (writes). Multi-key operations report once per key.
    fn record_bytes(&self, op: &'static str, key: &str, bytes_in: u64, bytes_out: u64) {
        debug!(
            "cache {} {}: {}B in, {}B out",
            op, key, bytes_in, bytes_out
        );
    }

    /// Record an operation with no payload to measure (delete, incr, TTL).
    fn record_call(&self, op: &'static str, key: &str) {
        debug!("cache {} {}", op, key);
    }
}

/// One structured line per operation: `{op}({keys}) on {server}: {outcome}`.
pub(crate) fn log_op(op: &str, keys: &str, server: &str, ok: bool) {
    debug!(
        "{}({}) on {}: {}",
        op,
        keys,
        server,
        if ok { "success" } else { "failure" }
    );
}

/// Default metrics implementation (no-op).
#[derive(Clone, Default)]
pub struct NoOpMetrics;

impl MetricsSink for NoOpMetrics {
    fn record_bytes(&self, _op: &'static str, _key: &str, _bytes_in: u64, _bytes_out: u64) {}
    fn record_call(&self, _op: &'static str, _key: &str) {}
}
