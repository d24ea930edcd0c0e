//! Sharded Memcached cache backend.
//!
//! `MemcachedCluster` spreads keys over independent memcached servers with
//! the same registry/selector/batch machinery as the Redis backend, over a
//! deadpool-memcached pool per server. Memcached has no replication, so the
//! failover walk only checks connectivity: a candidate that cannot be
//! dialed is skipped when a further candidate exists.
//!
//! # Protocol-level gaps
//!
//! The ascii protocol client exposes no `cas` or `touch` commands, so two
//! contract operations are unsupported on this backend and always return
//! their failure sentinel (with a warning, without recording a tracker
//! error): [`compare_and_set`] and [`change_ttl`]/[`change_ttl_multi`].
//! The ascii protocol also has no authentication, so
//! `ClusterConfig::password` is ignored here.
//!
//! `incr_with_init` cannot be expressed as a single pipelined
//! set-if-absent + atomic-increment round trip here. It falls back to
//! increment → add(init) → increment, each step individually atomic
//! server-side. Two callers racing on a fresh key normally converge (one
//! `add` wins, the loser increments), but the window between the failed
//! increment and the `add` is real: an entry created and expired (or
//! deleted) inside it can leave the counter at `step` instead of `init`.
//! That race is unresolved on this backend; use the Redis backend where the
//! initialization arithmetic must be exact under contention.
//!
//! [`compare_and_set`]: crate::client::CacheClient::compare_and_set
//! [`change_ttl`]: crate::client::CacheClient::change_ttl
//! [`change_ttl_multi`]: crate::client::CacheClient::change_ttl_multi

use crate::batch::BatchPlan;
use crate::client::{CacheClient, CasToken};
use crate::error::{Error, Result};
use crate::expiry::{unix_now, Expiry, RELATIVE_CUTOFF_SECS};
use crate::observability::{log_op, MetricsSink, NoOpMetrics};
use crate::registry::{ClusterConfig, ServerRegistry};
use crate::selector::ServerSelector;
use crate::tracker::{ErrorKind, ErrorTracker, WatchHandle};
use async_memcached::AsciiProtocol;
use dashmap::DashMap;
use deadpool::managed::Object;
use deadpool_memcached::{Manager, Pool};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

type Connection = Object<Manager>;

/// Convert an [`Expiry`] to memcached's expiration integer.
///
/// Memcached reads values below 30 days as relative seconds and anything
/// larger as an absolute Unix timestamp, so a long relative duration must be
/// rebased onto absolute time before crossing the wire.
fn memcached_expiration(expiry: Expiry) -> Option<i64> {
    match expiry {
        Expiry::Never => None,
        Expiry::After(d) => {
            let secs = d.as_secs().max(1);
            if secs < RELATIVE_CUTOFF_SECS {
                Some(secs as i64)
            } else {
                Some((unix_now() + secs) as i64)
            }
        }
        Expiry::At(ts) => Some(ts as i64),
    }
}

fn is_not_found(err: &async_memcached::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("not found") || msg.contains("not_found")
}

fn is_not_stored(err: &async_memcached::Error) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("not stored") || msg.contains("not_stored")
}

/// Sharded Memcached cache client.
#[derive(Clone)]
pub struct MemcachedCluster {
    config: Arc<ClusterConfig>,
    registry: Arc<ServerRegistry>,
    selector: Arc<ServerSelector>,
    pools: Arc<DashMap<String, Pool>>,
    tracker: Arc<ErrorTracker>,
    metrics: Arc<dyn MetricsSink>,
}

impl MemcachedCluster {
    /// Create a new sharded Memcached client from configuration.
    ///
    /// Pools are created lazily; this validates the configuration but opens
    /// no connections.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for an empty server list or duplicate
    /// tags.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        let registry = ServerRegistry::new(config.servers.clone())?;
        let selector = ServerSelector::new(registry.tags(), config.automatic_failover);

        info!(
            "Memcached cache client initialized: {} server(s), failover {}",
            registry.len(),
            if config.automatic_failover { "on" } else { "off" }
        );

        Ok(MemcachedCluster {
            config: Arc::new(config),
            registry: Arc::new(registry),
            selector: Arc::new(selector),
            pools: Arc::new(DashMap::new()),
            tracker: Arc::new(ErrorTracker::new()),
            metrics: Arc::new(NoOpMetrics),
        })
    }

    /// Set a custom metrics sink.
    pub fn with_metrics(mut self, metrics: Box<dyn MetricsSink>) -> Self {
        self.metrics = Arc::from(metrics);
        self
    }

    fn pool_for(&self, tag: &str) -> Result<Pool> {
        if let Some(pool) = self.pools.get(tag) {
            return Ok(pool.clone());
        }

        let addr = self
            .registry
            .addr_of(tag)
            .ok_or_else(|| Error::ConfigError(format!("unknown server tag: {}", tag)))?;

        let manager = Manager::new(addr.to_string());
        let pool = Pool::builder(manager)
            .max_size(self.config.pool_size as usize)
            .runtime(deadpool::Runtime::Tokio1)
            .create_timeout(Some(self.config.connect_timeout))
            .wait_timeout(Some(self.config.connect_timeout))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create pool for {}: {}", tag, e)))?;

        debug!("pool created for server {} ({})", tag, addr);
        Ok(self.pools.entry(tag.to_string()).or_insert(pool).clone())
    }

    async fn connect(&self, tag: &str) -> Result<Connection> {
        let pool = self.pool_for(tag)?;
        pool.get()
            .await
            .map_err(|e| Error::Unreachable(format!("connect to {} failed: {}", tag, e)))
    }

    fn discard(&self, conn: Connection) {
        let _ = Object::take(conn);
    }

    fn release(&self, conn: Connection) {
        if self.config.persistent {
            drop(conn);
        } else {
            let _ = Object::take(conn);
        }
    }

    fn handle_failure(
        &self,
        op: &'static str,
        keys: &str,
        tag: &str,
        conn: Connection,
        err: async_memcached::Error,
    ) {
        self.discard(conn);
        self.tracker.record(ErrorKind::Unexpected);
        warn!("{} on {} failed: {}", op, tag, err);
        log_op(op, keys, tag, false);
    }

    async fn route_key(
        &self,
        key: &str,
        live: &mut HashMap<String, Connection>,
        dead: &mut HashSet<String>,
    ) -> Option<String> {
        for tag in self.selector.candidates(key) {
            if live.contains_key(tag) {
                return Some(tag.to_string());
            }
            if dead.contains(tag) {
                continue;
            }
            match self.connect(tag).await {
                Ok(conn) => {
                    live.insert(tag.to_string(), conn);
                    return Some(tag.to_string());
                }
                Err(e) => {
                    debug!("candidate {} unavailable for key {}: {}", tag, key, e);
                    dead.insert(tag.to_string());
                }
            }
        }
        None
    }

    async fn connection_for(&self, key: &str) -> Option<(String, Connection)> {
        let mut live = HashMap::new();
        let mut dead = HashSet::new();

        match self.route_key(key, &mut live, &mut dead).await {
            Some(tag) => {
                let conn = live.remove(&tag)?;
                Some((tag, conn))
            }
            None => {
                warn!("no usable server for key {}", key);
                self.tracker.record(ErrorKind::Unreachable);
                None
            }
        }
    }

    async fn plan_batches(&self, keys: &[String]) -> (Vec<(String, Connection, Vec<String>)>, bool) {
        let mut live = HashMap::new();
        let mut dead = HashSet::new();
        let mut resolved: HashMap<String, Option<String>> = HashMap::with_capacity(keys.len());

        for key in keys {
            if !resolved.contains_key(key) {
                let tag = self.route_key(key, &mut live, &mut dead).await;
                resolved.insert(key.clone(), tag);
            }
        }

        let plan = BatchPlan::build(keys.iter().cloned(), |key| {
            resolved.get(key).cloned().flatten()
        });

        let fully_routed = plan.is_fully_routed();
        if !fully_routed {
            warn!(
                "no usable server for {} key(s): {}",
                plan.unroutable().len(),
                plan.unroutable().join(",")
            );
            self.tracker.record(ErrorKind::Unreachable);
        }

        let mut batches = Vec::new();
        for (tag, group) in plan.into_groups() {
            if let Some(conn) = live.remove(&tag) {
                batches.push((tag, conn, group));
            }
        }
        (batches, fully_routed)
    }
}

impl CacheClient for MemcachedCluster {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let (tag, mut conn) = self.connection_for(key).await?;

        match conn.get(key).await {
            Ok(value) => {
                let found = value.and_then(|v| v.data);
                log_op("get", key, &tag, true);
                match &found {
                    Some(data) => self.metrics.record_bytes("get", key, data.len() as u64, 0),
                    None => self.metrics.record_call("get", key),
                }
                self.release(conn);
                found
            }
            Err(e) => {
                self.handle_failure("get", key, &tag, conn, e);
                None
            }
        }
    }

    async fn get_with_token(&self, key: &str) -> Option<(Vec<u8>, CasToken)> {
        let (tag, mut conn) = self.connection_for(key).await?;

        match conn.get(key).await {
            Ok(value) => {
                log_op("getWithToken", key, &tag, true);
                self.release(conn);
                value.and_then(|v| v.data).map(|data| {
                    self.metrics
                        .record_bytes("getWithToken", key, data.len() as u64, 0);
                    let token = CasToken(data.clone());
                    (data, token)
                })
            }
            Err(e) => {
                self.handle_failure("getWithToken", key, &tag, conn, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return false;
        };
        let size = value.len() as u64;

        match conn
            .set(key, value.as_slice(), memcached_expiration(expiry), None)
            .await
        {
            Ok(_) => {
                log_op("set", key, &tag, true);
                self.metrics.record_bytes("set", key, 0, size);
                self.release(conn);
                true
            }
            Err(e) => {
                self.handle_failure("set", key, &tag, conn, e);
                false
            }
        }
    }

    async fn add(&self, key: &str, value: Vec<u8>, expiry: Expiry) -> bool {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return false;
        };
        let size = value.len() as u64;

        match conn
            .add(key, value.as_slice(), memcached_expiration(expiry), None)
            .await
        {
            Ok(_) => {
                log_op("add", key, &tag, true);
                self.metrics.record_bytes("add", key, 0, size);
                self.release(conn);
                true
            }
            // The key already existing is a valid negative outcome.
            Err(e) if is_not_stored(&e) => {
                log_op("add", key, &tag, true);
                self.release(conn);
                false
            }
            Err(e) => {
                self.handle_failure("add", key, &tag, conn, e);
                false
            }
        }
    }

    async fn compare_and_set(
        &self,
        _token: CasToken,
        key: &str,
        _value: Vec<u8>,
        _expiry: Expiry,
    ) -> bool {
        // The ascii client has no cas command; see the module docs.
        warn!("compare_and_set is not supported on the memcached backend (key {})", key);
        false
    }

    async fn delete(&self, key: &str) -> bool {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return false;
        };

        match conn.delete(key).await {
            Ok(_) => {
                log_op("delete", key, &tag, true);
                self.metrics.record_call("delete", key);
                self.release(conn);
                true
            }
            // Deleting an absent key still succeeds.
            Err(e) if is_not_found(&e) => {
                log_op("delete", key, &tag, true);
                self.metrics.record_call("delete", key);
                self.release(conn);
                true
            }
            Err(e) => {
                self.handle_failure("delete", key, &tag, conn, e);
                false
            }
        }
    }

    async fn get_multi(&self, keys: &[String]) -> HashMap<String, Vec<u8>> {
        if keys.is_empty() {
            return HashMap::new();
        }
        let (batches, _) = self.plan_batches(keys).await;

        let outcomes = join_all(batches.into_iter().map(|(tag, mut conn, group)| async move {
            let refs: Vec<&str> = group.iter().map(|k| k.as_str()).collect();
            match conn.get_multi(&refs).await {
                Ok(values) => Ok((tag, conn, group, values)),
                Err(e) if is_not_found(&e) => Ok((tag, conn, group, Vec::new())),
                Err(e) => Err((tag, conn, group, e)),
            }
        }))
        .await;

        let mut found = HashMap::new();
        for outcome in outcomes {
            match outcome {
                Ok((tag, conn, group, values)) => {
                    log_op("getMulti", &group.join(","), &tag, true);
                    self.release(conn);
                    for value in values {
                        let key = String::from_utf8_lossy(&value.key).to_string();
                        if let Some(data) = value.data {
                            self.metrics
                                .record_bytes("getMulti", &key, data.len() as u64, 0);
                            found.insert(key, data);
                        }
                    }
                }
                Err((tag, conn, group, e)) => {
                    self.handle_failure("getMulti", &group.join(","), &tag, conn, e);
                }
            }
        }
        found
    }

    async fn set_multi(&self, values: HashMap<String, Vec<u8>>, expiry: Expiry) -> bool {
        if values.is_empty() {
            return true;
        }
        let keys: Vec<String> = values.keys().cloned().collect();
        let (batches, fully_routed) = self.plan_batches(&keys).await;
        let expiration = memcached_expiration(expiry);

        let mut values = values;
        let jobs: Vec<_> = batches
            .into_iter()
            .map(|(tag, conn, group)| {
                let pairs: Vec<(String, Vec<u8>)> = group
                    .into_iter()
                    .filter_map(|key| values.remove(&key).map(|value| (key, value)))
                    .collect();
                (tag, conn, pairs)
            })
            .collect();

        let outcomes = join_all(jobs.into_iter().map(|(tag, mut conn, pairs)| async move {
            // The ascii protocol is request/response; a per-server batch
            // degrades to sequential commands on one pooled connection.
            for (key, value) in &pairs {
                if let Err(e) = conn.set(key, value.as_slice(), expiration, None).await {
                    return Err((tag, conn, pairs, e));
                }
            }
            Ok((tag, conn, pairs))
        }))
        .await;

        let mut ok = fully_routed;
        for outcome in outcomes {
            match outcome {
                Ok((tag, conn, pairs)) => {
                    let keys_line: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                    log_op("setMulti", &keys_line.join(","), &tag, true);
                    self.release(conn);
                    for (key, value) in &pairs {
                        self.metrics
                            .record_bytes("setMulti", key, 0, value.len() as u64);
                    }
                }
                Err((tag, conn, pairs, e)) => {
                    ok = false;
                    let keys_line: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
                    self.handle_failure("setMulti", &keys_line.join(","), &tag, conn, e);
                }
            }
        }
        ok
    }

    async fn delete_multi(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }
        let (batches, fully_routed) = self.plan_batches(keys).await;

        let outcomes = join_all(batches.into_iter().map(|(tag, mut conn, group)| async move {
            for key in &group {
                match conn.delete(key).await {
                    Ok(_) => {}
                    Err(e) if is_not_found(&e) => {}
                    Err(e) => return Err((tag, conn, group, e)),
                }
            }
            Ok((tag, conn, group))
        }))
        .await;

        let mut ok = fully_routed;
        for outcome in outcomes {
            match outcome {
                Ok((tag, conn, group)) => {
                    log_op("deleteMulti", &group.join(","), &tag, true);
                    self.release(conn);
                    for key in &group {
                        self.metrics.record_call("deleteMulti", key);
                    }
                }
                Err((tag, conn, group, e)) => {
                    ok = false;
                    self.handle_failure("deleteMulti", &group.join(","), &tag, conn, e);
                }
            }
        }
        ok
    }

    async fn change_ttl(&self, key: &str, _expiry: Expiry) -> bool {
        // The ascii client has no touch command; see the module docs.
        warn!("change_ttl is not supported on the memcached backend (key {})", key);
        false
    }

    async fn change_ttl_multi(&self, keys: &[String], _expiry: Expiry) -> bool {
        warn!(
            "change_ttl_multi is not supported on the memcached backend ({} key(s))",
            keys.len()
        );
        false
    }

    async fn incr(&self, key: &str, delta: u64) -> Option<i64> {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return None;
        };

        match conn.increment(key, delta).await {
            Ok(value) => {
                log_op("incr", key, &tag, true);
                self.metrics.record_call("incr", key);
                self.release(conn);
                Some(value as i64)
            }
            // Incrementing a missing key is a no-op failure by contract.
            Err(e) if is_not_found(&e) => {
                log_op("incr", key, &tag, true);
                self.release(conn);
                None
            }
            Err(e) => {
                self.handle_failure("incr", key, &tag, conn, e);
                None
            }
        }
    }

    async fn decr(&self, key: &str, delta: u64) -> Option<i64> {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return None;
        };

        match conn.decrement(key, delta).await {
            Ok(value) => {
                log_op("decr", key, &tag, true);
                self.metrics.record_call("decr", key);
                self.release(conn);
                Some(value as i64)
            }
            Err(e) if is_not_found(&e) => {
                log_op("decr", key, &tag, true);
                self.release(conn);
                None
            }
            Err(e) => {
                self.handle_failure("decr", key, &tag, conn, e);
                None
            }
        }
    }

    async fn incr_with_init(
        &self,
        key: &str,
        expiry: Expiry,
        step: u64,
        init: u64,
    ) -> Option<i64> {
        let Some((tag, mut conn)) = self.connection_for(key).await else {
            return None;
        };

        // increment → add(init) → increment. Each step is atomic on the
        // server, but the sequence as a whole is not; see the module docs
        // for the unresolved initialization race.
        let result: std::result::Result<Option<i64>, async_memcached::Error> = async {
            match conn.increment(key, step).await {
                Ok(value) => return Ok(Some(value as i64)),
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e),
            }

            let payload = init.to_string();
            match conn
                .add(key, payload.as_bytes(), memcached_expiration(expiry), None)
                .await
            {
                Ok(_) => return Ok(Some(init as i64)),
                Err(e) if is_not_stored(&e) => {}
                Err(e) => return Err(e),
            }

            // Lost the initialization race; the winner planted `init`.
            match conn.increment(key, step).await {
                Ok(value) => Ok(Some(value as i64)),
                Err(e) if is_not_found(&e) => Ok(None),
                Err(e) => Err(e),
            }
        }
        .await;

        match result {
            Ok(value) => {
                log_op("incrWithInit", key, &tag, true);
                self.metrics.record_call("incrWithInit", key);
                self.release(conn);
                value
            }
            Err(e) => {
                self.handle_failure("incrWithInit", key, &tag, conn, e);
                None
            }
        }
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
