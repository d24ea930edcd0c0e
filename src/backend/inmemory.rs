//! In-memory cache backend (default, thread-safe, async).
//!
//! Process-local reference implementation of the [`CacheClient`] contract.
//! Uses DashMap for lock-free concurrent access with per-key sharding; the
//! map's entry locking is what makes `add`, `compare_and_set` and the
//! counter operations atomic with respect to concurrent callers. TTL
//! expiration is handled on access.
//!
//! There is no network here, so operations cannot fail at the transport
//! level: the error tracker stays quiet, and the only negative outcomes are
//! the contract's negative-but-valid ones (miss, already-exists, CAS
//! mismatch, absent counter).

use crate::client::{CacheClient, CasToken};
use crate::expiry::{unix_now, Expiry};
use crate::observability::{log_op, MetricsSink, NoOpMetrics};
use crate::tracker::{ErrorKind, ErrorTracker, WatchHandle};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stored entry with optional expiration.
struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, expiry: Expiry) -> Self {
        CacheEntry {
            data,
            expires_at: deadline(expiry),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

fn deadline(expiry: Expiry) -> Option<Instant> {
    expiry
        .as_ttl_secs(unix_now())
        .map(|secs| Instant::now() + Duration::from_secs(secs))
}

/// Parse a counter value (ASCII decimal integer).
fn parse_counter(data: &[u8]) -> Option<i64> {
    std::str::from_utf8(data).ok()?.trim().parse().ok()
}

/// Thread-safe async in-memory cache.
///
/// # Example
///
/// ```no_run
/// use shard_cache::{CacheClient, Expiry, InMemoryCache};
///
/// #[tokio::main]
/// async fn main() {
///     let cache = InMemoryCache::new();
///
///     assert!(cache.set("k", b"v".to_vec(), Expiry::Never).await);
///     assert_eq!(cache.get("k").await, Some(b"v".to_vec()));
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryCache {
    store: Arc<DashMap<String, CacheEntry>>,
    tracker: Arc<ErrorTracker>,
    metrics: Arc<dyn MetricsSink>,
}

impl InMemoryCache {
    /// Create a new in-memory cache.
    pub fn new() -> Self {
        InMemoryCache {
            store: Arc::new(DashMap::new()),
            tracker: Arc::new(ErrorTracker::new()),
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Set a custom metrics sink.
    pub fn with_metrics(mut self, metrics: Box<dyn MetricsSink>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    /// Current number of entries (including not-yet-collected expired ones).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Memory statistics.
    pub fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.data.len()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                return Some(entry.data.clone());
            }
        }
        // Collect the expired entry, if any.
        self.store.remove_if(key, |_, entry| entry.is_expired());
        None
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let found = self.read(key);
        log_op("get", key, "local", found.is_some());
        match &found {
            Some(data) => self.metrics.record_bytes("get", key, data.len() as u64, 0),
            None => self.metrics.record_call("get", key),
        }
        found
    }

    async fn get_with_token(&self, key: &str) -> Option<(Vec<u8>, CasToken)> {
        let found = self.read(key);
        log_op("getWithToken", key, "local", found.is_some());
        found.map(|data| {
            self.metrics
                .record_bytes("getWithToken", key, data.len() as u64, 0);
            let token = CasToken(data.clone());
            (data, token)
        })
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool {
        self.metrics
            .record_bytes("set", key, 0, value.len() as u64);
        self.store
            .insert(key.to_string(), CacheEntry::new(value, expiry));
        log_op("set", key, "local", true);
        true
    }

    async fn add(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool {
        let stored = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if occupied.get().is_expired() => {
                occupied.insert(CacheEntry::new(value, expiry));
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(value, expiry));
                true
            }
        };
        log_op("add", key, "local", stored);
        if stored {
            self.metrics.record_call("add", key);
        }
        stored
    }

    async fn compare_and_set(
        &self,
        token: CasToken,
        key: &str,
        value: Vec<u8>,
        expiry: Expiry,
    ) -> bool {
        let swapped = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied)
                if !occupied.get().is_expired() && token.matches(&occupied.get().data) =>
            {
                occupied.insert(CacheEntry::new(value, expiry));
                true
            }
            _ => false,
        };
        log_op("cas", key, "local", swapped);
        if swapped {
            self.metrics.record_call("cas", key);
        }
        swapped
    }

    async fn delete(&self, key: &str) -> bool {
        self.store.remove(key);
        log_op("delete", key, "local", true);
        self.metrics.record_call("delete", key);
        // Idempotent by contract.
        true
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(data) = self.read(key) {
                self.metrics
                    .record_bytes("getMulti", key, data.len() as u64, 0);
                found.insert(key.clone(), data);
            }
        }
        log_op("getMulti", &keys.join(","), "local", true);
        found
    }

    async fn set_multi(&self, values: HashMap<String, Vec<u8>>, expiry: Expiry) -> bool {
        let keys_line = values.keys().cloned().collect::<Vec<_>>().join(",");
        for (key, value) in values {
            self.metrics
                .record_bytes("setMulti", &key, 0, value.len() as u64);
            self.store.insert(key, CacheEntry::new(value, expiry));
        }
        log_op("setMulti", &keys_line, "local", true);
        true
    }

    async fn delete_multi(&self, keys: &[String]) -> bool {
        for key in keys {
            self.store.remove(key);
            self.metrics.record_call("deleteMulti", key);
        }
        log_op("deleteMulti", &keys.join(","), "local", true);
        true
    }

    async fn change_ttl(&self, key: &str, expiry: Expiry) -> bool {
        let changed = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                occupied.get_mut().expires_at = deadline(expiry);
                true
            }
            _ => false,
        };
        log_op("changeTTL", key, "local", changed);
        self.metrics.record_call("changeTTL", key);
        changed
    }

    async fn change_ttl_multi(&self, keys: &[String], expiry: Expiry) -> bool {
        let mut all = true;
        for key in keys {
            all &= self.change_ttl(key, expiry).await;
        }
        all
    }

    async fn incr(&self, key: &str, delta: u64) -> Option<i64> {
        let result = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                match parse_counter(&occupied.get().data) {
                    Some(current) => {
                        let next = current.wrapping_add(delta as i64);
                        occupied.get_mut().data = next.to_string().into_bytes();
                        Some(next)
                    }
                    None => {
                        warn!("incr on non-numeric value for key {}", key);
                        None
                    }
                }
            }
            _ => None,
        };
        log_op("incr", key, "local", result.is_some());
        self.metrics.record_call("incr", key);
        result
    }

    async fn decr(&self, key: &str, delta: u64) -> Option<i64> {
        let result = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                match parse_counter(&occupied.get().data) {
                    Some(current) => {
                        let next = current.wrapping_sub(delta as i64);
                        occupied.get_mut().data = next.to_string().into_bytes();
                        Some(next)
                    }
                    None => {
                        warn!("decr on non-numeric value for key {}", key);
                        None
                    }
                }
            }
            _ => None,
        };
        log_op("decr", key, "local", result.is_some());
        self.metrics.record_call("decr", key);
        result
    }

    async fn incr_with_init(
        &self,
        key: &str,
        expiry: Expiry,
        step: u64,
        init: u64,
    ) -> Option<i64> {
        // The entry lock spans the whole check-and-mutate, so racing callers
        // serialize and the final value is the same as any serial order.
        let result = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) if !occupied.get().is_expired() => {
                match parse_counter(&occupied.get().data) {
                    Some(current) => {
                        let next = current.wrapping_add(step as i64);
                        occupied.get_mut().data = next.to_string().into_bytes();
                        Some(next)
                    }
                    None => {
                        warn!("incrWithInit on non-numeric value for key {}", key);
                        None
                    }
                }
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(CacheEntry::new(init.to_string().into_bytes(), expiry));
                Some(init as i64)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(init.to_string().into_bytes(), expiry));
                Some(init as i64)
            }
        };
        log_op("incrWithInit", key, "local", result.is_some());
        self.metrics.record_call("incrWithInit", key);
        result
    }

    fn mark(&self) -> WatchHandle {
        self.tracker.mark()
    }

    fn has_error_since(&self, watch: &WatchHandle) -> bool {
        self.tracker.has_error_since(watch)
    }

    fn last_error(&self) -> ErrorKind {
        self.tracker.last_error()
    }

    fn clear_last_error(&self) {
        self.tracker.clear_last_error();
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get() {
        let cache = InMemoryCache::new();

        assert!(cache.set("key1", b"value1".to_vec(), Expiry::Never).await);
        assert_eq!(cache.get("key1").await, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_miss() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("nonexistent").await, None);
        // A miss is not an error.
        assert_eq!(cache.last_error(), ErrorKind::None);
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let cache = InMemoryCache::new();

        cache
            .set(
                "key1",
                b"value1".to_vec(),
                Expiry::After(Duration::from_secs(1)),
            )
            .await;
        assert!(cache.get("key1").await.is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_add_respects_existing() {
        let cache = InMemoryCache::new();

        assert!(cache.add("key1", b"first".to_vec(), Expiry::Never).await);
        assert!(!cache.add("key1", b"second".to_vec(), Expiry::Never).await);
        assert_eq!(cache.get("key1").await, Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_add_replaces_expired_entry() {
        let cache = InMemoryCache::new();

        cache
            .set("key1", b"old".to_vec(), Expiry::After(Duration::from_secs(1)))
            .await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(cache.add("key1", b"new".to_vec(), Expiry::Never).await);
        assert_eq!(cache.get("key1").await, Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_compare_and_set() {
        let cache = InMemoryCache::new();
        cache.set("key1", b"v1".to_vec(), Expiry::Never).await;

        let (_, token) = cache
            .get_with_token("key1")
            .await
            .expect("Failed to get token");

        // A competing write invalidates the token.
        cache.set("key1", b"v2".to_vec(), Expiry::Never).await;
        assert!(
            !cache
                .compare_and_set(token, "key1", b"v3".to_vec(), Expiry::Never)
                .await
        );
        assert_eq!(cache.get("key1").await, Some(b"v2".to_vec()));

        // A fresh token succeeds.
        let (_, token) = cache
            .get_with_token("key1")
            .await
            .expect("Failed to get token");
        assert!(
            cache
                .compare_and_set(token, "key1", b"v3".to_vec(), Expiry::Never)
                .await
        );
        assert_eq!(cache.get("key1").await, Some(b"v3".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let cache = InMemoryCache::new();
        cache.set("key1", b"value".to_vec(), Expiry::Never).await;

        assert!(cache.delete("key1").await);
        assert!(cache.delete("key1").await);
        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_get_multi_returns_present_only() {
        let cache = InMemoryCache::new();
        cache.set("key1", b"v1".to_vec(), Expiry::Never).await;
        cache.set("key2", b"v2".to_vec(), Expiry::Never).await;

        let keys = vec![
            "key1".to_string(),
            "key2".to_string(),
            "missing".to_string(),
        ];
        let found = cache.get_multi(&keys).await;

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("key1"), Some(&b"v1".to_vec()));
        assert_eq!(found.get("key2"), Some(&b"v2".to_vec()));
        assert!(!found.contains_key("missing"));
    }

    #[tokio::test]
    async fn test_set_multi_and_delete_multi() {
        let cache = InMemoryCache::new();

        let mut values = HashMap::new();
        values.insert("key1".to_string(), b"v1".to_vec());
        values.insert("key2".to_string(), b"v2".to_vec());
        assert!(cache.set_multi(values, Expiry::Never).await);
        assert_eq!(cache.len(), 2);

        let keys = vec!["key1".to_string(), "key2".to_string()];
        assert!(cache.delete_multi(&keys).await);
        assert_eq!(cache.get("key1").await, None);
        assert_eq!(cache.get("key2").await, None);
    }

    #[tokio::test]
    async fn test_change_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("key1", b"v1".to_vec(), Expiry::After(Duration::from_secs(1)))
            .await;

        // Make indefinite; the entry must survive the original deadline.
        assert!(cache.change_ttl("key1", Expiry::Never).await);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("key1").await, Some(b"v1".to_vec()));

        // Changing TTL of a missing key fails.
        assert!(!cache.change_ttl("missing", Expiry::Never).await);
    }

    #[tokio::test]
    async fn test_incr_requires_existing_key() {
        let cache = InMemoryCache::new();

        assert_eq!(cache.incr("counter", 5).await, None);

        cache.set("counter", b"10".to_vec(), Expiry::Never).await;
        assert_eq!(cache.incr("counter", 5).await, Some(15));
        assert_eq!(cache.decr("counter", 3).await, Some(12));
    }

    #[tokio::test]
    async fn test_incr_non_numeric_fails() {
        let cache = InMemoryCache::new();
        cache.set("blob", b"not a number".to_vec(), Expiry::Never).await;

        assert_eq!(cache.incr("blob", 1).await, None);
    }

    #[tokio::test]
    async fn test_incr_with_init_fresh_and_existing() {
        let cache = InMemoryCache::new();

        assert_eq!(
            cache.incr_with_init("hits", Expiry::Never, 5, 5).await,
            Some(5)
        );
        assert_eq!(
            cache.incr_with_init("hits", Expiry::Never, 5, 5).await,
            Some(10)
        );
    }

    #[tokio::test]
    async fn test_incr_with_init_distinct_step_and_init() {
        let cache = InMemoryCache::new();

        assert_eq!(
            cache
                .incr_with_init("quota", Expiry::After(Duration::from_secs(60)), 1, 100)
                .await,
            Some(100)
        );
        assert_eq!(
            cache
                .incr_with_init("quota", Expiry::After(Duration::from_secs(60)), 1, 100)
                .await,
            Some(101)
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let cache = InMemoryCache::new();
        cache.set("key1", b"some data".to_vec(), Expiry::Never).await;
        cache.set("key2", b"more".to_vec(), Expiry::Never).await;

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.total_bytes, 13);
    }

    #[tokio::test]
    async fn test_clone_shares_store() {
        let cache1 = InMemoryCache::new();
        cache1.set("key", b"value".to_vec(), Expiry::Never).await;

        let cache2 = cache1.clone();
        assert_eq!(cache2.get("key").await, Some(b"value".to_vec()));
    }
}
