use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::net::host::HostDescription;
use crate::protocol::{DriverResult, Request, Response};

/// Capability contract shared by both transports.
///
/// `execute` fails with a `Status` error for non-success responses the
/// recovery ladder could not absorb, and with a `Transport` error when the
/// exchange could not complete at all. `close` is idempotent; executing on
/// a closed connection is a programming error and fails fast.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, request: Request) -> DriverResult<Response>;

    async fn close(&self);

    /// How long the server is willing to keep this connection idle, when
    /// it advertised one. Pools use it to discard stale entries.
    fn idle_validity(&self) -> Option<Duration> {
        None
    }
}

/// Creates connections of one transport for the pool of a host.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create(&self, host: &HostDescription) -> DriverResult<Arc<dyn Connection>>;

    /// Pool bound for this transport.
    fn max_connections(&self) -> usize;

    /// Age after which a pooled connection is discarded instead of reused.
    fn connection_ttl(&self) -> Option<Duration>;
}
