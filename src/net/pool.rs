//! Per-host connection pool.
//!
//! Connections are created lazily up to the transport's bound; beyond the
//! bound, acquisition blocks until a slot frees up. An entry past its
//! time-to-live, or idle longer than the server's advertised keep-alive,
//! is discarded and replaced instead of reused.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::net::connection::{Connection, ConnectionFactory};
use crate::net::host::HostDescription;
use crate::protocol::{DriverError, DriverResult, Request, Response};

struct IdleEntry {
    conn: Arc<dyn Connection>,
    created_at: Instant,
    idle_since: Instant,
}

struct PoolShared {
    idle: Mutex<VecDeque<IdleEntry>>,
    closed: AtomicBool,
}

pub struct ConnectionPool {
    description: HostDescription,
    factory: Arc<dyn ConnectionFactory>,
    ttl: Option<Duration>,
    permits: Arc<Semaphore>,
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    pub fn new(description: HostDescription, factory: Arc<dyn ConnectionFactory>) -> Self {
        let max_connections = factory.max_connections().max(1);
        let ttl = factory.connection_ttl();
        Self {
            description,
            factory,
            ttl,
            permits: Arc::new(Semaphore::new(max_connections)),
            shared: Arc::new(PoolShared {
                idle: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Borrows a connection, creating one if no reusable entry exists.
    /// Blocks once the bound is reached until a slot is returned.
    pub async fn acquire(&self) -> DriverResult<PooledConnection> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DriverError::Closed)?;

        loop {
            let entry = self.shared.idle.lock().unwrap().pop_front();
            match entry {
                Some(entry) if self.expired(&entry) => {
                    debug!("discarding expired connection to {}", self.description);
                    let conn = entry.conn;
                    tokio::spawn(async move { conn.close().await });
                }
                Some(entry) => {
                    return Ok(PooledConnection {
                        conn: entry.conn,
                        created_at: entry.created_at,
                        shared: self.shared.clone(),
                        _permit: permit,
                    });
                }
                None => break,
            }
        }

        debug!("opening new connection to {}", self.description);
        let conn = self.factory.create(&self.description).await?;
        Ok(PooledConnection {
            conn,
            created_at: Instant::now(),
            shared: self.shared.clone(),
            _permit: permit,
        })
    }

    fn expired(&self, entry: &IdleEntry) -> bool {
        if let Some(ttl) = self.ttl {
            if entry.created_at.elapsed() >= ttl {
                return true;
            }
        }
        if let Some(validity) = entry.conn.idle_validity() {
            if entry.idle_since.elapsed() >= validity {
                return true;
            }
        }
        false
    }

    /// Closes every idle connection and refuses further acquisition.
    /// Connections checked out at this moment are dropped on return.
    pub async fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        let drained: Vec<IdleEntry> = self.shared.idle.lock().unwrap().drain(..).collect();
        for entry in drained {
            entry.conn.close().await;
        }
    }
}

/// A borrowed connection. Returns to the pool's idle list on drop.
pub struct PooledConnection {
    conn: Arc<dyn Connection>,
    created_at: Instant,
    shared: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub async fn execute(&self, request: Request) -> DriverResult<Response> {
        self.conn.execute(request).await
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.shared.closed.load(Ordering::SeqCst) {
            return;
        }
        self.shared.idle.lock().unwrap().push_back(IdleEntry {
            conn: self.conn.clone(),
            created_at: self.created_at,
            idle_since: Instant::now(),
        });
    }
}
