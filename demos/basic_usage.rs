//! Basic usage walkthrough of the cache client contract.
//!
//! Runs entirely in-process against the in-memory backend:
//!
//! ```text
//! cargo run --example basic_usage
//! ```

use serde::{Deserialize, Serialize};
use shard_cache::serialization::{decode_value, encode_value};
use shard_cache::{CacheClient, Expiry, InMemoryCache, Result};
use std::time::Duration;

/// Example typed value stored through the envelope codec.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
struct Session {
    user: u64,
    display_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cache = InMemoryCache::new();

    println!("=== Typed values through the envelope codec ===");
    let session = Session {
        user: 17,
        display_name: "Alice".to_string(),
    };
    let bytes = encode_value(&session)?;
    cache
        .set("session:17", bytes, Expiry::After(Duration::from_secs(1800)))
        .await;

    if let Some(raw) = cache.get("session:17").await {
        let loaded: Session = decode_value(&raw)?;
        println!("  loaded {:?}", loaded);
    }

    println!("=== add() as mutual exclusion ===");
    let first = cache.add("lock:report", b"worker-1".to_vec(), Expiry::Never).await;
    let second = cache.add("lock:report", b"worker-2".to_vec(), Expiry::Never).await;
    println!("  worker-1 acquired: {}, worker-2 acquired: {}", first, second);

    println!("=== Counters with lazy initialization ===");
    for _ in 0..3 {
        let hits = cache
            .incr_with_init("hits:frontpage", Expiry::Never, 1, 1)
            .await;
        println!("  page hits: {:?}", hits);
    }

    println!("=== Watch points: miss vs. outage ===");
    let watch = cache.mark();
    let value = cache.get("absent-key").await;
    println!(
        "  value: {:?}, error since watch: {} (a miss is not an error)",
        value,
        cache.has_error_since(&watch)
    );

    Ok(())
}
