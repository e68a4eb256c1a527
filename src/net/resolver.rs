//! Host resolution and selection.
//!
//! The registry owns the current `HostSet` snapshot and swaps it whole on
//! re-resolution, so in-flight selections never observe a partially
//! updated set. Selection is a policy choice at the selection point; the
//! executor falls back through the returned order on transport failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rand::Rng;
use tracing::info;

use crate::net::connection::ConnectionFactory;
use crate::net::host::{Host, HostDescription, HostSet};
use crate::net::pool::ConnectionPool;
use crate::protocol::{DriverError, DriverResult};

#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns the current set of endpoints. `initial` marks the first
    /// resolution at client construction; `close_connections` asks the
    /// caller to tear down pools of hosts no longer in the set.
    async fn resolve(
        &self,
        initial: bool,
        close_connections: bool,
    ) -> DriverResult<Vec<HostDescription>>;
}

/// Resolver for a topology supplied up front that never changes.
pub struct StaticResolver {
    hosts: Vec<HostDescription>,
}

impl StaticResolver {
    pub fn new(hosts: Vec<HostDescription>) -> Self {
        Self { hosts }
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(
        &self,
        _initial: bool,
        _close_connections: bool,
    ) -> DriverResult<Vec<HostDescription>> {
        Ok(self.hosts.clone())
    }
}

/// Which host a dispatch starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadBalancing {
    /// Always the primary (first) host.
    #[default]
    None,
    /// Rotate through the set per call.
    RoundRobin,
    /// Uniform pick per call.
    Random,
}

pub struct HostRegistry {
    resolver: Arc<dyn HostResolver>,
    factory: Arc<dyn ConnectionFactory>,
    strategy: LoadBalancing,
    hosts: RwLock<Arc<HostSet>>,
    cursor: AtomicUsize,
}

impl HostRegistry {
    /// Builds the registry and performs the initial resolution.
    pub async fn bootstrap(
        resolver: Arc<dyn HostResolver>,
        factory: Arc<dyn ConnectionFactory>,
        strategy: LoadBalancing,
    ) -> DriverResult<Self> {
        let registry = Self {
            resolver,
            factory,
            strategy,
            hosts: RwLock::new(Arc::new(HostSet::default())),
            cursor: AtomicUsize::new(0),
        };
        registry.refresh(true, false).await?;
        Ok(registry)
    }

    pub fn snapshot(&self) -> Arc<HostSet> {
        self.hosts.read().unwrap().clone()
    }

    /// Hosts in try-order for one dispatch, per the configured strategy.
    pub fn selection_order(&self) -> Vec<Arc<Host>> {
        let set = self.snapshot();
        if set.is_empty() {
            return Vec::new();
        }
        let start = match self.strategy {
            LoadBalancing::None => 0,
            LoadBalancing::RoundRobin => self.cursor.fetch_add(1, Ordering::Relaxed) % set.len(),
            LoadBalancing::Random => rand::thread_rng().gen_range(0..set.len()),
        };
        set.ordered_from(start)
    }

    /// Re-resolves the topology and swaps the snapshot atomically. Hosts
    /// that survive keep their pools; pools of dropped hosts are closed
    /// when `close_connections` is set.
    pub async fn refresh(&self, initial: bool, close_connections: bool) -> DriverResult<()> {
        let descriptions = self.resolver.resolve(initial, close_connections).await?;
        if descriptions.is_empty() {
            return Err(DriverError::Config(
                "host resolution produced an empty host list".to_string(),
            ));
        }

        let previous = self.snapshot();
        let next: Vec<Arc<Host>> = descriptions
            .into_iter()
            .map(|description| {
                previous.find(&description).unwrap_or_else(|| {
                    Arc::new(Host::new(
                        description.clone(),
                        ConnectionPool::new(description, self.factory.clone()),
                    ))
                })
            })
            .collect();
        let next = Arc::new(HostSet::new(next));
        let dropped: Vec<Arc<Host>> = previous
            .iter()
            .filter(|host| next.find(host.description()).is_none())
            .cloned()
            .collect();

        *self.hosts.write().unwrap() = next;

        if close_connections {
            for host in dropped {
                info!("closing connections to removed host {}", host.description());
                host.close().await;
            }
        }
        Ok(())
    }

    pub async fn close(&self) {
        let set = self.snapshot();
        for host in set.iter() {
            host.close().await;
        }
    }
}
