use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::net::pool::ConnectionPool;

/// A server endpoint, compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostDescription {
    host: String,
    port: u16,
}

impl HostDescription {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parses a server-supplied redirect location of the form
    /// `scheme://host:port/...`. Returns `None` for anything else.
    pub fn from_location(location: &str) -> Option<Self> {
        let url = Url::parse(location).ok()?;
        let host = url.host_str()?.to_string();
        let port = url.port_or_known_default()?;
        Some(Self { host, port })
    }
}

impl fmt::Display for HostDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One known endpoint together with its connection pool. Lives as long as
/// the client, unless re-resolution removes it.
pub struct Host {
    description: HostDescription,
    pool: ConnectionPool,
}

impl Host {
    pub(crate) fn new(description: HostDescription, pool: ConnectionPool) -> Self {
        Self { description, pool }
    }

    pub fn description(&self) -> &HostDescription {
        &self.description
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}

/// Ordered, immutable snapshot of the known endpoints. Re-resolution
/// replaces the whole set atomically; in-flight selections keep reading
/// the snapshot they started with.
#[derive(Clone, Default)]
pub struct HostSet {
    hosts: Vec<Arc<Host>>,
}

impl HostSet {
    pub fn new(hosts: Vec<Arc<Host>>) -> Self {
        Self { hosts }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Host>> {
        self.hosts.iter()
    }

    pub fn find(&self, description: &HostDescription) -> Option<Arc<Host>> {
        self.hosts
            .iter()
            .find(|host| host.description() == description)
            .cloned()
    }

    /// Hosts in try-order: the selected host first, then the rest of the
    /// set wrapping around, for failover.
    pub fn ordered_from(&self, start: usize) -> Vec<Arc<Host>> {
        if self.hosts.is_empty() {
            return Vec::new();
        }
        let start = start % self.hosts.len();
        self.hosts[start..]
            .iter()
            .chain(self.hosts[..start].iter())
            .cloned()
            .collect()
    }
}
