//! Driver defaults and the resolved client configuration.

use std::time::Duration;

use crate::protocol::{chunk, WireFormat};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8529;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_USE_SSL: bool = false;
pub const MAX_CONNECTIONS_CHUNKED_DEFAULT: usize = 1;
pub const MAX_CONNECTIONS_HTTP_DEFAULT: usize = 20;

/// Transport and body encoding selected at client construction.
///
/// `Chunked` is the persistent-socket binary protocol; the HTTP variants
/// differ only in how bodies are encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    #[default]
    Chunked,
    HttpJson,
    HttpBinary,
}

impl Protocol {
    pub fn wire_format(&self) -> WireFormat {
        match self {
            Protocol::HttpJson => WireFormat::Json,
            Protocol::Chunked | Protocol::HttpBinary => WireFormat::MessagePack,
        }
    }
}

/// Resolved configuration shared by every connection of a client.
///
/// Built by `FabricClientBuilder::build`, which validates the raw settings
/// up front so a malformed configuration fails at construction.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub protocol: Protocol,
    pub user: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub jwt_auth: bool,
    pub use_ssl: bool,
    pub ca_certificate: Option<reqwest::Certificate>,
    /// `None` means no timeout, matching a configured value of zero.
    pub timeout: Option<Duration>,
    pub connection_ttl: Option<Duration>,
    pub cookie_policy: Option<String>,
    pub keep_alive_interval: Option<Duration>,
    pub max_connections: Option<usize>,
    pub chunk_content_size: usize,
}

impl ClientConfig {
    pub fn wire_format(&self) -> WireFormat {
        self.protocol.wire_format()
    }

    /// Transport-specific pool bound when none is configured.
    pub fn effective_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(match self.protocol {
            Protocol::Chunked => MAX_CONNECTIONS_CHUNKED_DEFAULT,
            Protocol::HttpJson | Protocol::HttpBinary => MAX_CONNECTIONS_HTTP_DEFAULT,
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            user: Some(DEFAULT_USER.to_string()),
            password: None,
            email: None,
            jwt_auth: false,
            use_ssl: DEFAULT_USE_SSL,
            ca_certificate: None,
            timeout: None,
            connection_ttl: None,
            cookie_policy: None,
            keep_alive_interval: None,
            max_connections: None,
            chunk_content_size: chunk::CHUNK_DEFAULT_CONTENT_SIZE,
        }
    }
}
