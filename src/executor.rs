//! Request orchestration.
//!
//! The executor turns an abstract `Request` into a decoded result: it asks
//! the registry for the selection order, borrows a connection from the
//! chosen host's pool, and falls back through the remaining hosts when a
//! host cannot be reached at the transport level. Per-host recovery
//! (credential refresh, backoff) already happened inside the connection by
//! the time an error reaches this layer.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::entity::Entity;
use crate::net::resolver::HostRegistry;
use crate::protocol::{DriverError, DriverResult, Request, Response};
use crate::serialization::Serialization;

pub struct Executor {
    registry: Arc<HostRegistry>,
    serialization: Serialization,
}

impl Executor {
    pub(crate) fn new(registry: Arc<HostRegistry>, serialization: Serialization) -> Self {
        Self {
            registry,
            serialization,
        }
    }

    pub fn serialization(&self) -> &Serialization {
        &self.serialization
    }

    /// Executes and decodes through the custom path. A 404 response or an
    /// absent body yields `None`, never an error.
    pub async fn execute<T: DeserializeOwned>(&self, request: Request) -> DriverResult<Option<T>> {
        let response = self.dispatch(request).await?;
        self.serialization.custom_result(&response)
    }

    /// Executes and decodes a driver-owned entity shape.
    pub async fn execute_internal<T: Entity>(&self, request: Request) -> DriverResult<Option<T>> {
        let response = self.dispatch(request).await?;
        self.serialization.internal_result(&response)
    }

    /// Executes and hands back the raw response.
    pub async fn execute_raw(&self, request: Request) -> DriverResult<Response> {
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request) -> DriverResult<Response> {
        let hosts = self.registry.selection_order();
        if hosts.is_empty() {
            return Err(DriverError::Config("no hosts configured".to_string()));
        }

        let mut last_error = None;
        for host in hosts {
            let connection = match host.pool().acquire().await {
                Ok(connection) => connection,
                Err(error) if error.is_transport() || matches!(error, DriverError::Closed) => {
                    warn!("could not reach {}: {}", host.description(), error);
                    last_error = Some(error);
                    continue;
                }
                Err(error) => return Err(error),
            };
            match connection.execute(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_transport() => {
                    warn!(
                        "host {} failed, falling back to the next host: {}",
                        host.description(),
                        error
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_error
            .unwrap_or_else(|| DriverError::Transport("all hosts exhausted".to_string())))
    }
}
