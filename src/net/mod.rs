//! Transports, pooling, and host management.

pub mod binary;
pub mod connection;
pub mod host;
pub mod http;
pub mod pool;
pub mod resolver;
pub(crate) mod retry;

pub use binary::{BinaryConnection, BinaryConnectionFactory};
pub use connection::{Connection, ConnectionFactory};
pub use host::{Host, HostDescription, HostSet};
pub use http::{HttpConnection, HttpConnectionFactory};
pub use pool::{ConnectionPool, PooledConnection};
pub use resolver::{HostRegistry, HostResolver, LoadBalancing, StaticResolver};

use crate::protocol::{codec, DriverError, Response, WireFormat};

/// Builds a structured status error from a non-success response, decoding
/// the server's error document when the body carries one.
pub(crate) fn response_error(format: WireFormat, response: &Response) -> DriverError {
    let entity = response
        .body
        .as_deref()
        .and_then(|body| codec::decode::<crate::entity::ErrorEntity>(format, body).ok());
    match entity {
        Some(entity) => DriverError::Status {
            code: response.code,
            error_num: entity.error_num,
            message: entity
                .error_message
                .unwrap_or_else(|| format!("HTTP {}", response.code)),
        },
        None => DriverError::Status {
            code: response.code,
            error_num: None,
            message: format!("HTTP {}", response.code),
        },
    }
}
