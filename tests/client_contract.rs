//! Contract tests for the cache operation boundary.
//!
//! These run against the in-memory backend, which implements the full
//! contract with per-key atomicity, so every law here is exercised without
//! external servers.

use shard_cache::serialization::{decode_value, encode_value};
use shard_cache::{CacheClient, ErrorKind, Expiry, InMemoryCache};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct Session {
    user: u64,
    csrf: String,
}

/// Round-trip law: set(k, v) then get(k) yields v.
#[tokio::test]
async fn test_set_then_get_round_trip() {
    let cache = InMemoryCache::new();

    assert!(
        cache
            .set("page:1", b"rendered".to_vec(), Expiry::Never)
            .await
    );
    assert_eq!(cache.get("page:1").await, Some(b"rendered".to_vec()));

    assert!(
        cache
            .set(
                "page:2",
                b"expiring".to_vec(),
                Expiry::After(Duration::from_secs(300)),
            )
            .await
    );
    assert_eq!(cache.get("page:2").await, Some(b"expiring".to_vec()));
}

/// A key never set reads as not found, and that is not an error.
#[tokio::test]
async fn test_unset_key_is_a_clean_miss() {
    let cache = InMemoryCache::new();
    let watch = cache.mark();

    assert_eq!(cache.get("never-set").await, None);

    assert!(!cache.has_error_since(&watch));
    assert_eq!(cache.last_error(), ErrorKind::None);
}

/// delete is idempotent: true both times regardless of prior existence.
#[tokio::test]
async fn test_delete_is_idempotent() {
    let cache = InMemoryCache::new();
    cache.set("k", b"v".to_vec(), Expiry::Never).await;

    assert!(cache.delete("k").await);
    assert!(cache.delete("k").await);
    assert!(cache.delete("never-existed").await);
}

/// add(k, v1) then add(k, v2): the second fails and v1 survives.
#[tokio::test]
async fn test_add_first_writer_wins() {
    let cache = InMemoryCache::new();

    assert!(cache.add("lock", b"v1".to_vec(), Expiry::Never).await);
    assert!(!cache.add("lock", b"v2".to_vec(), Expiry::Never).await);
    assert_eq!(cache.get("lock").await, Some(b"v1".to_vec()));

    // "already exists" is a negative-but-valid outcome, not an error.
    assert_eq!(cache.last_error(), ErrorKind::None);
}

/// A CAS token from get_with_token guards against lost updates.
#[tokio::test]
async fn test_compare_and_set_prevents_lost_update() {
    let cache = InMemoryCache::new();
    cache.set("doc", b"rev1".to_vec(), Expiry::Never).await;

    let (value, token) = cache
        .get_with_token("doc")
        .await
        .expect("Failed to get token");
    assert_eq!(value, b"rev1".to_vec());

    // Another writer sneaks in; the stale token must fail without effect.
    cache.set("doc", b"rev2".to_vec(), Expiry::Never).await;
    assert!(
        !cache
            .compare_and_set(token, "doc", b"rev1b".to_vec(), Expiry::Never)
            .await
    );
    assert_eq!(cache.get("doc").await, Some(b"rev2".to_vec()));
}

/// get_multi returns present keys only; set_multi stores everything.
#[tokio::test]
async fn test_multi_operations() {
    let cache = InMemoryCache::new();

    let mut values = HashMap::new();
    values.insert("x".to_string(), b"1".to_vec());
    values.insert("y".to_string(), b"2".to_vec());
    assert!(cache.set_multi(values, Expiry::Never).await);

    let keys = vec!["x".to_string(), "y".to_string(), "z".to_string()];
    let found = cache.get_multi(&keys).await;
    assert_eq!(found.len(), 2);
    assert_eq!(found.get("x"), Some(&b"1".to_vec()));
    assert_eq!(found.get("y"), Some(&b"2".to_vec()));

    assert!(cache.delete_multi(&keys).await);
    assert!(cache.get_multi(&keys).await.is_empty());
}

/// incr_with_init(k, ttl, step=5, init=5): fresh key yields 5, then 10.
#[tokio::test]
async fn test_incr_with_init_arithmetic() {
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

/// N concurrent incr_with_init calls on a fresh key leave exactly N.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_incr_with_init_loses_no_updates() {
    const N: usize = 100;
    let cache = InMemoryCache::new();

    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache
                .incr_with_init("counter", Expiry::Never, 1, 1)
                .await
                .expect("increment failed")
        }));
    }
    for handle in handles {
        handle.await.expect("task failed");
    }

    assert_eq!(cache.get("counter").await, Some(N.to_string().into_bytes()));
}

/// incr and decr refuse to create missing keys.
#[tokio::test]
async fn test_counter_ops_require_existing_key() {
    let cache = InMemoryCache::new();

    assert_eq!(cache.incr("c", 3).await, None);
    assert_eq!(cache.decr("c", 3).await, None);

    cache.set("c", b"7".to_vec(), Expiry::Never).await;
    assert_eq!(cache.incr("c", 3).await, Some(10));
    assert_eq!(cache.decr("c", 4).await, Some(6));
}

/// changeTTL supports all three expiration kinds.
#[tokio::test]
async fn test_change_ttl_kinds() {
    let cache = InMemoryCache::new();
    cache
        .set("k", b"v".to_vec(), Expiry::After(Duration::from_secs(1)))
        .await;

    // Indefinite: survives the original deadline.
    assert!(cache.change_ttl("k", Expiry::Never).await);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(cache.get("k").await.is_some());

    // Relative: back on the clock.
    assert!(
        cache
            .change_ttl("k", Expiry::After(Duration::from_secs(1)))
            .await
    );
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(cache.get("k").await.is_none());

    // Missing keys cannot have their TTL changed.
    assert!(!cache.change_ttl("k", Expiry::Never).await);
}

/// Typed values flow through the envelope codec on top of the byte contract.
#[tokio::test]
async fn test_typed_value_via_envelope() {
    let cache = InMemoryCache::new();
    let session = Session {
        user: 17,
        csrf: "tok".to_string(),
    };

    let bytes = encode_value(&session).expect("Failed to encode");
    cache.set("session:17", bytes, Expiry::Never).await;

    let raw = cache.get("session:17").await.expect("Value missing");
    let back: Session = decode_value(&raw).expect("Failed to decode");
    assert_eq!(back, session);
}

/// Watch points scope error queries to a span of calls.
#[tokio::test]
async fn test_watch_points_stay_scoped_per_span() {
    let cache = InMemoryCache::new();

    let outer = cache.mark();
    cache.get("a").await;
    cache.set("a", b"1".to_vec(), Expiry::Never).await;
    let inner = cache.mark();
    cache.get("a").await;

    // The in-memory backend cannot fail at the transport level, so neither
    // span observed an error.
    assert!(!cache.has_error_since(&outer));
    assert!(!cache.has_error_since(&inner));
    assert_eq!(cache.last_error(), ErrorKind::None);
}
