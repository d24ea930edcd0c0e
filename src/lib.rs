//! # shard-cache
//!
//! A sharded, failover-aware key-value cache client for Rust.
//!
//! Stores, fetches, and atomically mutates opaque byte values in a cluster
//! of independent cache servers, hiding server selection, connection reuse,
//! pipelined batching, and partial-failure handling behind one operation
//! contract.
//!
//! ## Features
//!
//! - **Consistent routing:** rendezvous hashing maps every key to a
//!   deterministic, ordered candidate list of servers, identical across
//!   processes, no coordination service
//! - **Automatic failover:** unhealthy candidates are probed and skipped
//!   while an alternative remains
//! - **Pipelined batching:** multi-key operations issue one round trip per
//!   destination server, and one server's failure never aborts the rest
//! - **Best-effort by contract:** no operation ever raises a transport
//!   error; failures surface as sentinel values plus watch-point-scoped
//!   error state
//! - **Backend Agnostic:** in-memory (default), Redis, Memcached
//!
//! ## Quick Start
//!
//! ```ignore
//! use shard_cache::{CacheClient, ClusterConfig, Expiry};
//! use shard_cache::backend::RedisCluster;
//!
//! // 1. Describe the cluster (tags are the hashing unit, not addresses)
//! let config = ClusterConfig::from_tagged([
//!     ("cache-a", "10.0.0.1:6379"),
//!     ("cache-b", "10.0.0.2:6379"),
//! ]);
//!
//! // 2. Build the client - Clone is cheap (Arc increments) for sharing
//! let cache = RedisCluster::new(config)?;
//!
//! // 3. Use it
//! cache.set("user:17", b"profile bytes".to_vec(), Expiry::Never).await;
//! let value = cache.get("user:17").await;
//!
//! // 4. Distinguish a miss from an outage when it matters
//! let watch = cache.mark();
//! if cache.get("user:17").await.is_none() && cache.has_error_since(&watch) {
//!     // unreachable, not absent
//! }
//! ```
//!
//! Typed values go through [`serialization`]; counters are raw ASCII
//! integers handled by `incr`/`decr`/`incr_with_init` directly.

#[macro_use]
extern crate log;

pub mod backend;
pub mod batch;
pub mod client;
pub mod error;
pub mod expiry;
pub mod observability;
pub mod registry;
pub mod selector;
pub mod serialization;
pub mod tracker;

// Re-exports for convenience
#[cfg(feature = "inmemory")]
pub use backend::InMemoryCache;
#[cfg(feature = "memcached")]
pub use backend::MemcachedCluster;
#[cfg(feature = "redis")]
pub use backend::RedisCluster;
pub use client::{CacheClient, CasToken};
pub use error::{Error, Result};
pub use expiry::Expiry;
pub use registry::{ClusterConfig, ServerRegistry, ServerSpec};
pub use selector::ServerSelector;
pub use tracker::{ErrorKind, ErrorTracker, WatchHandle};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
