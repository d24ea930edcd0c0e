//! Server registry and cluster configuration.

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::time::Duration;

/// Default per-server connection pool size.
/// Formula: (CPU cores × 2) + 1
/// For 8-core systems: 16 connections is optimal
const DEFAULT_POOL_SIZE: u32 = 16;

/// Default connection-establishment timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// One configured cache server.
///
/// The `tag` is the logical routing name and the hashing unit; the `addr` is
/// the network address. Keeping them separate lets operators remap an
/// address (hardware swap, DNS change) without perturbing the hash ring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSpec {
    pub tag: String,
    pub addr: String,
}

impl ServerSpec {
    /// A server whose tag is its address.
    pub fn from_addr(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        ServerSpec {
            tag: addr.clone(),
            addr,
        }
    }

    /// A server with an explicit routing tag.
    pub fn tagged(tag: impl Into<String>, addr: impl Into<String>) -> Self {
        ServerSpec {
            tag: tag.into(),
            addr: addr.into(),
        }
    }
}

/// Configuration for a sharded cache cluster, consumed at construction.
#[derive(Clone, Debug)]
pub struct ClusterConfig {
    /// Configured servers, in declaration order.
    pub servers: Vec<ServerSpec>,
    /// Enables multi-candidate routing and health probing. When `false`,
    /// each key is pinned to exactly one server and never fails over.
    pub automatic_failover: bool,
    /// Keep connections pooled across logical sessions. When `false`, a
    /// connection is closed after the call that borrowed it.
    pub persistent: bool,
    /// Connection-establishment timeout.
    pub connect_timeout: Duration,
    /// Shared-secret authentication, sent once per new connection.
    pub password: Option<String>,
    /// Per-server connection pool size.
    pub pool_size: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            servers: Vec::new(),
            automatic_failover: true,
            persistent: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            password: None,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl ClusterConfig {
    /// Configuration for a list of bare addresses (tag = address).
    pub fn from_addrs<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ClusterConfig {
            servers: addrs.into_iter().map(ServerSpec::from_addr).collect(),
            ..Default::default()
        }
    }

    /// Configuration for `(tag, addr)` pairs.
    pub fn from_tagged<I, S, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, A)>,
        S: Into<String>,
        A: Into<String>,
    {
        ClusterConfig {
            servers: pairs
                .into_iter()
                .map(|(tag, addr)| ServerSpec::tagged(tag, addr))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_automatic_failover(mut self, enabled: bool) -> Self {
        self.automatic_failover = enabled;
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }
}

/// Immutable registry of configured servers.
///
/// Validated once at construction; lookups by tag afterwards. The registry
/// never changes for the life of the client, which is what keeps the
/// selector's routing stable without a coordination service.
#[derive(Debug)]
pub struct ServerRegistry {
    servers: Vec<ServerSpec>,
}

impl ServerRegistry {
    /// Build a registry from configured servers.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the list is empty, a tag or address
    /// is empty, or two servers share a tag.
    pub fn new(servers: Vec<ServerSpec>) -> Result<Self> {
        if servers.is_empty() {
            return Err(Error::ConfigError("no cache servers configured".to_string()));
        }

        let mut seen = HashSet::with_capacity(servers.len());
        for spec in &servers {
            if spec.tag.is_empty() {
                return Err(Error::ConfigError(format!(
                    "server {} has an empty tag",
                    spec.addr
                )));
            }
            if spec.addr.is_empty() {
                return Err(Error::ConfigError(format!(
                    "server {} has an empty address",
                    spec.tag
                )));
            }
            if !seen.insert(spec.tag.as_str()) {
                return Err(Error::ConfigError(format!(
                    "duplicate server tag: {}",
                    spec.tag
                )));
            }
        }

        Ok(ServerRegistry { servers })
    }

    /// All server tags, in declaration order.
    pub fn tags(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.tag.clone()).collect()
    }

    /// Resolve a tag to its network address.
    pub fn addr_of(&self, tag: &str) -> Option<&str> {
        self.servers
            .iter()
            .find(|s| s.tag == tag)
            .map(|s| s.addr.as_str())
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
