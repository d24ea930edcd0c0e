//! Two-node failover walkthrough against real Redis servers.
//!
//! Start one Redis node locally (the second address is deliberately dead to
//! stand in for a downed server), then:
//!
//! ```text
//! cargo run --example failover --features redis
//! ```

use shard_cache::backend::RedisCluster;
use shard_cache::{CacheClient, ClusterConfig, Expiry, Result};
use std::collections::HashMap;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let config = ClusterConfig::from_tagged([
        ("alpha", "127.0.0.1:6379"),
        ("beta", "127.0.0.1:1"), // nothing listens here
    ]);
    let cache = RedisCluster::new(config)?;

    println!("=== Single-key writes fail over transparently ===");
    let watch = cache.mark();
    for i in 0..6 {
        let key = format!("demo:key-{}", i);
        let stored = cache.set(&key, b"value".to_vec(), Expiry::Never).await;
        println!("  set {} -> {}", key, stored);
    }
    println!("  errors during span: {}", cache.has_error_since(&watch));

    println!("=== Multi-key operations batch per server ===");
    let mut values = HashMap::new();
    for i in 0..6 {
        values.insert(format!("demo:key-{}", i), format!("v{}", i).into_bytes());
    }
    let keys: Vec<String> = values.keys().cloned().collect();

    let all_stored = cache.set_multi(values, Expiry::Never).await;
    let found = cache.get_multi(&keys).await;
    println!(
        "  setMulti ok: {}, getMulti returned {}/{} keys",
        all_stored,
        found.len(),
        keys.len()
    );

    cache.delete_multi(&keys).await;
    Ok(())
}
