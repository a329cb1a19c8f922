//! One HTTP attempt against one target.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::Response;
use reqwest::Client;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::Defaults;
use crate::proxy::rewrite::OutboundRequest;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Connection failed to '{target}': {message}")]
    Connection { target: String, message: String },

    #[error("Request timeout after {duration}s")]
    Timeout { duration: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Performs a single HTTP attempt. Retry and failover live above this.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, req: OutboundRequest) -> Result<Response<Body>, TransportError>;
}

/// Timeouts applied to upstream attempts.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub request: Duration,
    pub pool_idle: Duration,
    pub pool_max_idle_per_host: usize,
}

impl From<&Defaults> for TimeoutConfig {
    fn from(defaults: &Defaults) -> Self {
        Self {
            connect: Duration::from_secs(u64::from(defaults.connect_timeout_seconds)),
            request: Duration::from_secs(u64::from(defaults.timeout_seconds)),
            pool_idle: Duration::from_secs(u64::from(defaults.pool_idle_timeout_seconds)),
            pool_max_idle_per_host: defaults.pool_max_idle_per_host as usize,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from(&Defaults::default())
    }
}

/// reqwest-backed transport. Event streams are passed through as they
/// arrive; other bodies are buffered.
pub struct HttpTransport {
    client: Client,
    timeouts: TimeoutConfig,
}

impl HttpTransport {
    pub fn new(timeouts: TimeoutConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(timeouts.connect)
            .pool_idle_timeout(timeouts.pool_idle)
            .pool_max_idle_per_host(timeouts.pool_max_idle_per_host)
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeouts })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn do_send(&self, req: OutboundRequest) -> Result<Response<Body>, TransportError> {
        let target = req.url.clone();
        let upstream_resp = self
            .client
            .request(req.method, &req.url)
            .headers(req.headers)
            .body(req.body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                target: target.clone(),
                message: e.to_string(),
            })?;

        let is_streaming = upstream_resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/event-stream"));

        let status = upstream_resp.status();
        let mut response_builder = Response::builder().status(status);
        for (name, value) in upstream_resp.headers() {
            response_builder = response_builder.header(name, value);
        }

        let body = if is_streaming {
            Body::from_stream(upstream_resp.bytes_stream())
        } else {
            let bytes = upstream_resp
                .bytes()
                .await
                .map_err(|e| TransportError::Connection {
                    target: target.clone(),
                    message: format!("Failed to read response body: {}", e),
                })?;
            Body::from(bytes)
        };

        response_builder
            .body(body)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, req: OutboundRequest) -> Result<Response<Body>, TransportError> {
        match timeout(self.timeouts.request, self.do_send(req)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                duration: self.timeouts.request.as_secs(),
            }),
        }
    }
}
