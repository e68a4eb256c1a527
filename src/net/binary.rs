//! Binary chunked-socket transport.
//!
//! One persistent TCP stream per pooled connection. Requests and responses
//! are MessagePack-encoded messages split into chunks at the configured
//! content threshold and reassembled by message id. A connection slot
//! carries one in-flight message at a time, so chunks of different
//! messages never interleave on the same slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{ClientConfig, DEFAULT_USER};
use crate::entity::JwtEntity;
use crate::net::connection::{Connection, ConnectionFactory};
use crate::net::host::HostDescription;
use crate::net::response_error;
use crate::protocol::{
    chunk, codec, split_message, ChunkAssembler, DriverError, DriverResult, Request, Response,
    Verb, WireFormat,
};

/// Preamble identifying the wire protocol revision, sent once per socket.
pub const WIRE_MAGIC: &[u8] = b"fabricdb-chunk-v1\0";

pub struct BinaryConnectionFactory {
    config: Arc<ClientConfig>,
}

impl BinaryConnectionFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for BinaryConnectionFactory {
    async fn create(&self, host: &HostDescription) -> DriverResult<Arc<dyn Connection>> {
        let connection = BinaryConnection::connect(host.clone(), self.config.clone()).await?;
        Ok(Arc::new(connection))
    }

    fn max_connections(&self) -> usize {
        self.config.effective_max_connections()
    }

    fn connection_ttl(&self) -> Option<Duration> {
        self.config.connection_ttl
    }
}

pub struct BinaryConnection {
    host: HostDescription,
    config: Arc<ClientConfig>,
    stream: tokio::sync::Mutex<Option<TcpStream>>,
    message_ids: AtomicU64,
    jwt: RwLock<Option<Arc<str>>>,
}

impl BinaryConnection {
    pub(crate) async fn connect(
        host: HostDescription,
        config: Arc<ClientConfig>,
    ) -> DriverResult<Self> {
        let addr = format!("{}:{}", host.host(), host.port());
        let connecting = TcpStream::connect(&addr);
        let mut stream = match config.timeout {
            Some(timeout) => tokio::time::timeout(timeout, connecting)
                .await
                .map_err(|_| {
                    DriverError::Transport(format!("connecting to {} timed out", addr))
                })?,
            None => connecting.await,
        }
        .map_err(|e| DriverError::Transport(format!("failed to connect to {}: {}", addr, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| DriverError::Transport(format!("failed to set TCP_NODELAY: {}", e)))?;
        stream
            .write_all(WIRE_MAGIC)
            .await
            .map_err(|e| DriverError::Transport(format!("failed to send magic header: {}", e)))?;
        stream
            .flush()
            .await
            .map_err(|e| DriverError::Transport(format!("failed to flush: {}", e)))?;
        debug!("opened chunked connection to {}", host);

        let connection = Self {
            host,
            config,
            stream: tokio::sync::Mutex::new(Some(stream)),
            message_ids: AtomicU64::new(0),
            jwt: RwLock::new(None),
        };
        if connection.config.jwt_auth {
            connection.authenticate().await?;
        }
        Ok(connection)
    }

    /// Credential exchange as the first message on the socket.
    async fn authenticate(&self) -> DriverResult<()> {
        #[derive(Serialize)]
        struct AuthRequest<'a> {
            username: &'a str,
            password: &'a str,
            email: &'a str,
        }

        let body = codec::encode(
            WireFormat::MessagePack,
            &AuthRequest {
                username: self.config.user.as_deref().unwrap_or(DEFAULT_USER),
                password: self.config.password.as_deref().unwrap_or(""),
                email: self.config.email.as_deref().unwrap_or(""),
            },
        )?;
        let request = Request::new("", "", Verb::Post, "/_open/auth").body(body);
        let response = self.roundtrip(request).await?;
        if !response.is_success() {
            return Err(DriverError::Auth(format!(
                "credential exchange returned {}",
                response.code
            )));
        }
        let body = response
            .body
            .as_deref()
            .ok_or_else(|| DriverError::Auth("credential exchange returned no body".to_string()))?;
        let entity: JwtEntity = codec::decode(WireFormat::MessagePack, body)?;
        *self.jwt.write().unwrap() = Some(Arc::from(entity.jwt));
        debug!("chunked connection to {} authenticated", self.host);
        Ok(())
    }

    async fn roundtrip(&self, request: Request) -> DriverResult<Response> {
        let mut guard = self.stream.lock().await;
        let stream = guard.as_mut().ok_or(DriverError::Closed)?;

        let message = codec::encode(WireFormat::MessagePack, &request)?;
        let id = self.message_ids.fetch_add(1, Ordering::Relaxed) + 1;

        let exchange = Self::exchange(stream, id, &message, self.config.chunk_content_size);
        let result = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, exchange).await {
                Ok(result) => result,
                Err(_) => Err(DriverError::Transport(format!(
                    "exchange with {} timed out",
                    self.host
                ))),
            },
            None => exchange.await,
        };

        let payload = match result {
            Ok(payload) => payload,
            Err(error) => {
                // The stream may hold half a message; it cannot be reused.
                *guard = None;
                return Err(error);
            }
        };
        codec::decode(WireFormat::MessagePack, &payload)
    }

    async fn exchange(
        stream: &mut TcpStream,
        id: u64,
        message: &[u8],
        max_content: usize,
    ) -> DriverResult<Vec<u8>> {
        for piece in split_message(id, message, max_content) {
            stream
                .write_all(&piece)
                .await
                .map_err(|e| DriverError::Transport(format!("chunk write failed: {}", e)))?;
        }
        stream
            .flush()
            .await
            .map_err(|e| DriverError::Transport(format!("flush failed: {}", e)))?;

        let mut assembler = ChunkAssembler::new();
        loop {
            let (header, content) = chunk::read_chunk(stream, max_content).await?;
            if let Some((message_id, payload)) = assembler.push(&header, content)? {
                if message_id == id {
                    return Ok(payload);
                }
                return Err(DriverError::Protocol(format!(
                    "response for unexpected message {}",
                    message_id
                )));
            }
        }
    }
}

#[async_trait]
impl Connection for BinaryConnection {
    async fn execute(&self, request: Request) -> DriverResult<Response> {
        let mut request = request;
        if let Some(token) = self.jwt.read().unwrap().clone() {
            request
                .header_params
                .push(("authorization".to_string(), format!("Bearer {}", token)));
        }
        let response = self.roundtrip(request).await?;
        match response.code {
            code if (200..300).contains(&code) || code == 404 => Ok(response),
            _ => Err(response_error(WireFormat::MessagePack, &response)),
        }
    }

    async fn close(&self) {
        *self.stream.lock().await = None;
    }
}
