//! FabricDB Rust Client
//!
//! Native driver client for FabricDB, a geo-distributed multi-tenant
//! document database. Supports HTTP(S) with JSON or MessagePack bodies and
//! a persistent chunked binary socket protocol, with multi-host failover,
//! bounded per-host connection pools, and transparent credential refresh.
//!
//! # HTTP Example
//!
//! ```rust,no_run
//! use fabricdb_client::{FabricClient, Protocol};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), fabricdb_client::DriverError> {
//!     let client = FabricClient::builder()
//!         .host("localhost", 8529)
//!         .protocol(Protocol::HttpJson)
//!         .user("root")
//!         .password("password")
//!         .build()
//!         .await?;
//!
//!     let version = client.version().await?;
//!     println!("Connected to FabricDB {}", version.version);
//!
//!     let fabric = client.fabric("acme", "orders");
//!     let results: Vec<serde_json::Value> = fabric
//!         .query("FOR doc IN items RETURN doc", None)
//!         .await?;
//!     println!("{} documents", results.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod entity;
pub mod executor;
pub mod net;
pub mod protocol;
pub mod serialization;

pub use client::{Fabric, FabricClient, FabricClientBuilder};
pub use config::Protocol;
pub use entity::{
    CursorEntity, DocumentMetaEntity, Entity, ErrorEntity, JwtEntity, VersionEntity,
};
pub use executor::Executor;
pub use net::{HostDescription, HostResolver, LoadBalancing};
pub use protocol::{DriverError, DriverResult, Request, Response, Verb, WireFormat};
pub use serialization::Serialization;
