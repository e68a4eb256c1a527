//! High-level client surface.

mod builder;
mod fabric;

pub use builder::FabricClientBuilder;
pub use fabric::Fabric;

use std::sync::Arc;

use crate::entity::VersionEntity;
use crate::executor::Executor;
use crate::net::resolver::HostRegistry;
use crate::protocol::{DriverError, DriverResult, Request, Verb};

/// FabricDB driver client.
///
/// Owns the host registry and the executor; cheap to share via the
/// `Fabric` handles it hands out.
pub struct FabricClient {
    pub(crate) executor: Arc<Executor>,
    pub(crate) registry: Arc<HostRegistry>,
}

impl FabricClient {
    pub fn builder() -> FabricClientBuilder {
        FabricClientBuilder::new()
    }

    /// Executor for callers that build raw requests.
    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub async fn version(&self) -> DriverResult<VersionEntity> {
        let request = Request::new("", "", Verb::Get, "/_api/version");
        self.executor
            .execute_internal(request)
            .await?
            .ok_or_else(|| DriverError::Protocol("version endpoint returned no body".to_string()))
    }

    /// Handle on one tenant/fabric pair.
    pub fn fabric(&self, tenant: &str, name: &str) -> Fabric {
        Fabric::new(self.executor.clone(), tenant.to_string(), name.to_string())
    }

    /// Re-resolves the host topology. With `close_connections` set, pools
    /// of hosts that dropped out of the set are torn down.
    pub async fn refresh_host_list(&self, close_connections: bool) -> DriverResult<()> {
        self.registry.refresh(false, close_connections).await
    }

    /// Closes every pooled connection. The client must not be used
    /// afterward.
    pub async fn close(&self) {
        self.registry.close().await;
    }
}
