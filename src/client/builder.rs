use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientConfig, Protocol, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_USER};
use crate::executor::Executor;
use crate::net::binary::BinaryConnectionFactory;
use crate::net::connection::ConnectionFactory;
use crate::net::host::HostDescription;
use crate::net::http::HttpConnectionFactory;
use crate::net::resolver::{HostRegistry, HostResolver, LoadBalancing, StaticResolver};
use crate::protocol::chunk::CHUNK_DEFAULT_CONTENT_SIZE;
use crate::protocol::{DriverError, DriverResult};
use crate::serialization::Serialization;

use super::FabricClient;

/// Configures and constructs a [`FabricClient`].
///
/// Malformed settings fail `build`, not the first request.
pub struct FabricClientBuilder {
    hosts: Vec<HostDescription>,
    protocol: Protocol,
    user: Option<String>,
    password: Option<String>,
    email: Option<String>,
    jwt_auth: bool,
    use_ssl: bool,
    ca_certificate_pem: Option<Vec<u8>>,
    timeout: Option<Duration>,
    connection_ttl: Option<Duration>,
    cookie_policy: Option<String>,
    keep_alive_interval: Option<Duration>,
    max_connections: Option<usize>,
    chunk_content_size: usize,
    load_balancing: LoadBalancing,
    resolver: Option<Arc<dyn HostResolver>>,
}

impl Default for FabricClientBuilder {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            protocol: Protocol::default(),
            user: Some(DEFAULT_USER.to_string()),
            password: None,
            email: None,
            jwt_auth: false,
            use_ssl: false,
            ca_certificate_pem: None,
            timeout: None,
            connection_ttl: None,
            cookie_policy: None,
            keep_alive_interval: None,
            max_connections: None,
            chunk_content_size: CHUNK_DEFAULT_CONTENT_SIZE,
            load_balancing: LoadBalancing::default(),
            resolver: None,
        }
    }
}

impl FabricClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate server endpoint. May be called repeatedly; the
    /// first host added is the primary.
    pub fn host(mut self, host: &str, port: u16) -> Self {
        self.hosts.push(HostDescription::new(host, port));
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    /// Switches from Basic authentication to bearer tokens obtained via
    /// the credential exchange endpoint.
    pub fn jwt_auth(mut self, enabled: bool) -> Self {
        self.jwt_auth = enabled;
        self
    }

    pub fn use_ssl(mut self, enabled: bool) -> Self {
        self.use_ssl = enabled;
        self
    }

    /// Custom trust anchor in PEM form for TLS connections.
    pub fn ca_certificate(mut self, pem: Vec<u8>) -> Self {
        self.ca_certificate_pem = Some(pem);
        self
    }

    /// Connect/read timeout per attempt. Zero means no timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Age after which a pooled connection is replaced instead of reused.
    pub fn connection_ttl(mut self, ttl: Duration) -> Self {
        self.connection_ttl = Some(ttl);
        self
    }

    /// Cookie handling policy. `"ignore"` disables the cookie jar.
    pub fn cookie_policy(mut self, policy: &str) -> Self {
        self.cookie_policy = Some(policy.to_string());
        self
    }

    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Pool bound per host. Defaults to 1 for the chunked transport and
    /// 20 for HTTP.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn chunk_content_size(mut self, size: usize) -> Self {
        self.chunk_content_size = size;
        self
    }

    pub fn load_balancing(mut self, strategy: LoadBalancing) -> Self {
        self.load_balancing = strategy;
        self
    }

    /// Replaces the static host list with a custom resolver, for clusters
    /// whose topology is discovered at runtime.
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub async fn build(self) -> DriverResult<FabricClient> {
        if self.chunk_content_size == 0 {
            return Err(DriverError::Config(
                "chunk content size must be positive".to_string(),
            ));
        }
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err(DriverError::Config(
                    "max connections must be positive".to_string(),
                ));
            }
        }
        let ca_certificate = match self.ca_certificate_pem {
            Some(pem) => Some(reqwest::Certificate::from_pem(&pem).map_err(|e| {
                DriverError::Config(format!("invalid CA certificate: {}", e))
            })?),
            None => None,
        };

        let hosts = if self.hosts.is_empty() {
            vec![HostDescription::new(DEFAULT_HOST, DEFAULT_PORT)]
        } else {
            self.hosts
        };

        let config = Arc::new(ClientConfig {
            protocol: self.protocol,
            user: self.user,
            password: self.password,
            email: self.email,
            jwt_auth: self.jwt_auth,
            use_ssl: self.use_ssl,
            ca_certificate,
            timeout: self.timeout.filter(|timeout| !timeout.is_zero()),
            connection_ttl: self.connection_ttl,
            cookie_policy: self.cookie_policy,
            keep_alive_interval: self.keep_alive_interval,
            max_connections: self.max_connections,
            chunk_content_size: self.chunk_content_size,
        });

        let factory: Arc<dyn ConnectionFactory> = match config.protocol {
            Protocol::Chunked => Arc::new(BinaryConnectionFactory::new(config.clone())),
            Protocol::HttpJson | Protocol::HttpBinary => {
                Arc::new(HttpConnectionFactory::new(config.clone()))
            }
        };
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(StaticResolver::new(hosts)));
        let registry =
            Arc::new(HostRegistry::bootstrap(resolver, factory, self.load_balancing).await?);
        let executor = Arc::new(Executor::new(
            registry.clone(),
            Serialization::new(config.wire_format()),
        ));

        Ok(FabricClient { executor, registry })
    }
}
