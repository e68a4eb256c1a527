//! HTTP(S) transport.
//!
//! One `HttpConnection` owns one reqwest client capped at a single socket;
//! request concurrency comes from the `ConnectionPool` lending out several
//! connections. The recovery ladder lives here: credential refresh on 401,
//! the backoff loop for server errors and lost responses, and the
//! 404-is-not-an-error convention.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header;
use tracing::{debug, warn};

use crate::config::{ClientConfig, DEFAULT_USER};
use crate::entity::JwtEntity;
use crate::net::connection::{Connection, ConnectionFactory};
use crate::net::host::HostDescription;
use crate::net::response_error;
use crate::net::retry::{retry_with_backoff, Attempt};
use crate::protocol::{codec, DriverError, DriverResult, Request, Response, Verb, WireFormat};

pub(crate) const USER_AGENT: &str =
    concat!("fabricdb-rust-driver/", env!("CARGO_PKG_VERSION"));

const DEFAULT_KEEP_ALIVE_MILLIS: u64 = 30_000;

pub struct HttpConnectionFactory {
    config: Arc<ClientConfig>,
}

impl HttpConnectionFactory {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for HttpConnectionFactory {
    async fn create(&self, host: &HostDescription) -> DriverResult<Arc<dyn Connection>> {
        Ok(Arc::new(HttpConnection::new(
            host.clone(),
            self.config.clone(),
        )?))
    }

    fn max_connections(&self) -> usize {
        self.config.effective_max_connections()
    }

    fn connection_ttl(&self) -> Option<Duration> {
        self.config.connection_ttl
    }
}

/// How a send attempt failed, before any recovery was applied.
enum SendFailure {
    /// Connect-phase failure. Surfaced immediately so the executor can
    /// fall back to the next host in the set.
    Unreachable(DriverError),
    /// The exchange started but produced no usable response.
    NoResponse(DriverError),
    /// Not a transport problem at all (auth exchange, encoding).
    Fatal(DriverError),
}

impl SendFailure {
    fn into_error(self) -> DriverError {
        match self {
            SendFailure::Unreachable(e) | SendFailure::NoResponse(e) | SendFailure::Fatal(e) => e,
        }
    }
}

/// Classification of a received response.
enum Screened {
    Ok(Response),
    Unauthorized(DriverError),
    Retryable(DriverError),
    Fatal(DriverError),
}

pub struct HttpConnection {
    host: HostDescription,
    config: Arc<ClientConfig>,
    client: reqwest::Client,
    jwt: RwLock<Option<Arc<str>>>,
    refresh_lock: tokio::sync::Mutex<()>,
    keep_alive_hint_millis: AtomicU64,
    closed: AtomicBool,
}

impl HttpConnection {
    pub(crate) fn new(host: HostDescription, config: Arc<ClientConfig>) -> DriverResult<Self> {
        // One socket per connection; the pool provides parallelism.
        let mut builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(1);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout).connect_timeout(timeout);
        }
        if let Some(interval) = config.keep_alive_interval {
            builder = builder.tcp_keepalive(interval);
        }
        if let Some(policy) = &config.cookie_policy {
            if !policy.eq_ignore_ascii_case("ignore") {
                builder = builder.cookie_store(true);
            }
        }
        if config.use_ssl {
            if let Some(certificate) = &config.ca_certificate {
                builder = builder.add_root_certificate(certificate.clone());
            }
        }
        let client = builder
            .build()
            .map_err(|e| DriverError::Config(format!("HTTP client construction failed: {}", e)))?;

        Ok(Self {
            host,
            config,
            client,
            jwt: RwLock::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            keep_alive_hint_millis: AtomicU64::new(DEFAULT_KEEP_ALIVE_MILLIS),
            closed: AtomicBool::new(false),
        })
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host.host(), self.host.port())
    }

    fn build_url(&self, request: &Request) -> DriverResult<String> {
        let mut url = self.base_url();
        if !request.tenant.is_empty() {
            url.push_str("/_tenant/");
            url.push_str(&request.tenant);
        }
        if !request.database.is_empty() {
            url.push_str("/_fabric/");
            url.push_str(&request.database);
        }
        url.push_str(&request.path);
        if !request.query_params.is_empty() {
            let encoded = serde_urlencoded::to_string(&request.query_params)
                .map_err(|e| DriverError::Protocol(format!("query encoding failed: {}", e)))?;
            url.push(if request.path.contains('?') { '&' } else { '?' });
            url.push_str(&encoded);
        }
        Ok(url)
    }

    fn current_token(&self) -> Option<Arc<str>> {
        self.jwt.read().unwrap().clone()
    }

    async fn ensure_token(&self) -> DriverResult<Arc<str>> {
        if let Some(token) = self.current_token() {
            return Ok(token);
        }
        self.refresh_token(None).await
    }

    /// Credential exchange against `/_open/auth` on this host. Exclusive:
    /// concurrent callers serialize on the refresh lock, and a caller whose
    /// stale token was already replaced skips the round-trip entirely.
    async fn refresh_token(&self, stale: Option<&str>) -> DriverResult<Arc<str>> {
        let _exclusive = self.refresh_lock.lock().await;
        if let Some(current) = self.current_token() {
            if stale != Some(current.as_ref()) {
                return Ok(current);
            }
        }

        #[derive(serde::Serialize)]
        struct AuthRequest<'a> {
            username: &'a str,
            password: &'a str,
            email: &'a str,
        }

        let format = self.config.wire_format();
        let body = codec::encode(
            format,
            &AuthRequest {
                username: self.config.user.as_deref().unwrap_or(DEFAULT_USER),
                password: self.config.password.as_deref().unwrap_or(""),
                email: self.config.email.as_deref().unwrap_or(""),
            },
        )?;

        let url = format!("{}/_open/auth", self.base_url());
        let mut builder = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, content_type(format))
            .body(body);
        if format == WireFormat::MessagePack {
            builder = builder.header(header::ACCEPT, format.media_type());
        }
        let response = self
            .dispatch(builder, &url)
            .await
            .map_err(SendFailure::into_error)?;
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
        let entity: JwtEntity = codec::decode(format, body)?;
        let token: Arc<str> = Arc::from(entity.jwt);
        *self.jwt.write().unwrap() = Some(token.clone());
        debug!("refreshed bearer credential for {}", self.host);
        Ok(token)
    }

    async fn send(&self, request: &Request) -> Result<Response, SendFailure> {
        let url = self.build_url(request).map_err(SendFailure::Fatal)?;
        let mut builder = self.client.request(method(request.verb), &url);
        let format = self.config.wire_format();
        if format == WireFormat::MessagePack {
            builder = builder.header(header::ACCEPT, format.media_type());
        }
        for (name, value) in &request.header_params {
            builder = builder.header(name, value);
        }
        if self.config.jwt_auth {
            let token = self.ensure_token().await.map_err(SendFailure::Fatal)?;
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        } else if let Some(user) = &self.config.user {
            builder = builder.header(
                header::AUTHORIZATION,
                basic_credentials(user, self.config.password.as_deref()),
            );
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(header::CONTENT_TYPE, content_type(format))
                .body(body.clone());
        }
        self.dispatch(builder, &url).await
    }

    async fn dispatch(
        &self,
        builder: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<Response, SendFailure> {
        let http_response = builder.send().await.map_err(|e| {
            let error = DriverError::Transport(format!("request to {} failed: {}", url, e));
            if e.is_connect() {
                SendFailure::Unreachable(error)
            } else {
                SendFailure::NoResponse(error)
            }
        })?;

        let code = http_response.status().as_u16();
        let mut meta = Vec::new();
        for (name, value) in http_response.headers() {
            if let Ok(value) = value.to_str() {
                meta.push((name.to_string(), value.to_string()));
            }
        }
        let bytes = http_response.bytes().await.map_err(|e| {
            SendFailure::NoResponse(DriverError::Transport(format!(
                "reading response from {} failed: {}",
                url, e
            )))
        })?;
        let body = (!bytes.is_empty()).then(|| bytes.to_vec());

        let response = Response { code, meta, body };
        self.keep_alive_hint_millis.store(
            keep_alive_duration(&response.meta).as_millis() as u64,
            Ordering::Relaxed,
        );
        Ok(response)
    }

    fn screen(&self, response: Response) -> Screened {
        let format = self.config.wire_format();
        match response.code {
            code if (200..300).contains(&code) => Screened::Ok(response),
            404 => {
                debug!("HTTP 404 from {}, handing back as absent resource", self.host);
                Screened::Ok(response)
            }
            401 => Screened::Unauthorized(response_error(format, &response)),
            code if code >= 500 => Screened::Retryable(response_error(format, &response)),
            _ => Screened::Fatal(response_error(format, &response)),
        }
    }

    async fn retry_loop(
        &self,
        request: &Request,
        first_error: DriverError,
    ) -> DriverResult<Response> {
        retry_with_backoff(first_error, move || {
            async move {
                match self.send(request).await {
                    Err(failure) => Attempt::Retry(failure.into_error()),
                    Ok(response) => match self.screen(response) {
                        Screened::Ok(response) => Attempt::Success(response),
                        Screened::Unauthorized(error) => {
                            // Credential expired mid-loop: refresh once, keep waiting.
                            let stale = self.current_token();
                            if let Err(refresh_error) = self.refresh_token(stale.as_deref()).await
                            {
                                warn!("re-authentication during retry failed: {}", refresh_error);
                            }
                            Attempt::Retry(error)
                        }
                        Screened::Retryable(error) => Attempt::Retry(error),
                        Screened::Fatal(error) => Attempt::Fatal(error),
                    },
                }
            }
        })
        .await
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn execute(&self, request: Request) -> DriverResult<Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        match self.send(&request).await {
            Err(SendFailure::Unreachable(error)) => Err(error),
            Err(SendFailure::NoResponse(error)) => self.retry_loop(&request, error).await,
            Err(SendFailure::Fatal(error)) => Err(error),
            Ok(response) => match self.screen(response) {
                Screened::Ok(response) => Ok(response),
                Screened::Fatal(error) => Err(error),
                Screened::Retryable(error) => self.retry_loop(&request, error).await,
                Screened::Unauthorized(_) => {
                    warn!("received HTTP 401 from {}, re-authenticating", self.host);
                    let stale = self.current_token();
                    self.refresh_token(stale.as_deref()).await?;
                    match self.send(&request).await {
                        Err(failure) => Err(failure.into_error()),
                        Ok(response) => match self.screen(response) {
                            Screened::Ok(response) => Ok(response),
                            Screened::Unauthorized(error)
                            | Screened::Retryable(error)
                            | Screened::Fatal(error) => Err(error),
                        },
                    }
                }
            },
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn idle_validity(&self) -> Option<Duration> {
        Some(Duration::from_millis(
            self.keep_alive_hint_millis.load(Ordering::Relaxed),
        ))
    }
}

fn method(verb: Verb) -> reqwest::Method {
    match verb {
        Verb::Get => reqwest::Method::GET,
        Verb::Post => reqwest::Method::POST,
        Verb::Put => reqwest::Method::PUT,
        Verb::Patch => reqwest::Method::PATCH,
        Verb::Delete => reqwest::Method::DELETE,
        Verb::Head => reqwest::Method::HEAD,
    }
}

fn content_type(format: WireFormat) -> &'static str {
    match format {
        WireFormat::Json => "application/json; charset=utf-8",
        WireFormat::MessagePack => "application/x-msgpack",
    }
}

fn basic_credentials(user: &str, password: Option<&str>) -> String {
    let raw = format!("{}:{}", user, password.unwrap_or(""));
    format!("Basic {}", STANDARD.encode(raw))
}

/// Keep-alive hint from a `Keep-Alive: timeout=N` style header, in seconds
/// on the wire. Defaults to 30 seconds when absent or unparseable.
pub(crate) fn keep_alive_duration(meta: &[(String, String)]) -> Duration {
    for (name, value) in meta {
        if !name.eq_ignore_ascii_case("keep-alive") {
            continue;
        }
        for element in value.split(',') {
            if let Some((param, timeout)) = element.split_once('=') {
                if param.trim().eq_ignore_ascii_case("timeout") {
                    if let Ok(secs) = timeout.trim().parse::<u64>() {
                        return Duration::from_secs(secs);
                    }
                }
            }
        }
    }
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;
    use axum::{extract::State, routing::post, Json, Router};
    use std::sync::atomic::AtomicUsize;

    fn connection_for(host: HostDescription, jwt_auth: bool) -> HttpConnection {
        let config = ClientConfig {
            protocol: Protocol::HttpJson,
            user: Some("root".to_string()),
            password: Some("secret".to_string()),
            jwt_auth,
            ..ClientConfig::default()
        };
        HttpConnection::new(host, Arc::new(config)).unwrap()
    }

    #[test]
    fn test_url_contains_tenant_then_fabric_before_the_path() {
        let connection = connection_for(HostDescription::new("db1", 8529), false);
        let request = Request::new("acme", "orders", Verb::Get, "/_api/document/items");
        let url = connection.build_url(&request).unwrap();
        assert_eq!(
            url,
            "http://db1:8529/_tenant/acme/_fabric/orders/_api/document/items"
        );
    }

    #[test]
    fn test_url_omits_empty_tenant_and_fabric() {
        let connection = connection_for(HostDescription::new("db1", 8529), false);
        let request = Request::new("", "", Verb::Get, "/_api/version");
        assert_eq!(
            connection.build_url(&request).unwrap(),
            "http://db1:8529/_api/version"
        );
    }

    #[test]
    fn test_url_percent_encodes_query_params() {
        let connection = connection_for(HostDescription::new("db1", 8529), false);
        let request = Request::new("", "db", Verb::Get, "/_api/document/items")
            .query_param("filter", Some("a b&c"));
        let url = connection.build_url(&request).unwrap();
        assert_eq!(
            url,
            "http://db1:8529/_fabric/db/_api/document/items?filter=a+b%26c"
        );
    }

    #[test]
    fn test_url_appends_to_an_existing_query_string() {
        let connection = connection_for(HostDescription::new("db1", 8529), false);
        let request =
            Request::new("", "", Verb::Get, "/_api/list?limit=5").query_param("offset", Some(10));
        let url = connection.build_url(&request).unwrap();
        assert_eq!(url, "http://db1:8529/_api/list?limit=5&offset=10");
    }

    #[test]
    fn test_keep_alive_parsing() {
        let meta = vec![("Keep-Alive".to_string(), "timeout=5, max=100".to_string())];
        assert_eq!(keep_alive_duration(&meta), Duration::from_secs(5));

        let meta = vec![("keep-alive".to_string(), "max=100".to_string())];
        assert_eq!(keep_alive_duration(&meta), Duration::from_secs(30));

        let meta = vec![("Keep-Alive".to_string(), "timeout=abc".to_string())];
        assert_eq!(keep_alive_duration(&meta), Duration::from_secs(30));

        assert_eq!(keep_alive_duration(&[]), Duration::from_secs(30));
    }

    #[test]
    fn test_basic_credentials_encoding() {
        assert_eq!(basic_credentials("root", Some("pass")), "Basic cm9vdDpwYXNz");
        assert_eq!(basic_credentials("root", None), "Basic cm9vdDo=");
    }

    #[tokio::test]
    async fn test_concurrent_token_refresh_is_single_flight() {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/_open/auth",
                post(|State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Json(serde_json::json!({"jwt": "token-1"}))
                }),
            )
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let connection = Arc::new(connection_for(
            HostDescription::new("127.0.0.1", addr.port()),
            true,
        ));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let connection = connection.clone();
            tasks.push(tokio::spawn(async move {
                connection.ensure_token().await.unwrap()
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().as_ref(), "token-1");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
