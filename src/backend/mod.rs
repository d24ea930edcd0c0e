//! Cache backend implementations.
//!
//! Every backend implements the [`CacheClient`] contract:
//!
//! - [`InMemoryCache`] (default): process-local, reference semantics.
//! - `RedisCluster` (feature `redis`): sharded, pipelined, failover-aware.
//! - `MemcachedCluster` (feature `memcached`): sharded, with documented
//!   protocol-level gaps.
//!
//! [`CacheClient`]: crate::client::CacheClient

#[cfg(feature = "inmemory")]
pub mod inmemory;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryCache;
#[cfg(feature = "memcached")]
pub use memcached::MemcachedCluster;
#[cfg(feature = "redis")]
pub use redis::RedisCluster;
