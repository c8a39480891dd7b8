use crate::app::config::{ClientConfig, ConfigError};
use crate::models::response::HttpResponse;
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request context finished before the call completed")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Executes a single HTTP request to completion, body included.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: reqwest::Request) -> Result<HttpResponse, TransportError>;
}

/// Caps concurrent in-flight requests per `host:port`.
#[derive(Debug)]
struct HostLimiter {
    limit: usize,
    hosts: DashMap<String, Arc<Semaphore>>,
}

impl HostLimiter {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            hosts: DashMap::new(),
        }
    }

    async fn acquire(&self, url: &reqwest::Url) -> Result<OwnedSemaphorePermit, TransportError> {
        let key = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );
        let semaphore = self
            .hosts
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
            .value()
            .clone();

        semaphore
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Other("host connection limiter closed".to_string()))
    }
}

/// [`Transport`] backed by a dedicated `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    limiter: Option<Arc<HostLimiter>>,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            limiter: None,
        }
    }

    /// Builds one pooled client, using this client's share of the
    /// configured connection caps.
    pub fn from_config(config: &ClientConfig, index: usize) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .tcp_keepalive(config.keep_alive())
            .pool_idle_timeout(config.idle_conn_timeout());
        let max_idle = config.per_client_max_idle_conns_per_host();
        if max_idle > 0 {
            builder = builder.pool_max_idle_per_host(max_idle);
        }
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|source| ConfigError::Client { index, source })?;

        let max_conns = config.per_client_max_conns_per_host();
        let limiter = (max_conns > 0).then(|| Arc::new(HostLimiter::new(max_conns)));

        Ok(Self { client, limiter })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: reqwest::Request) -> Result<HttpResponse, TransportError> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(limiter.acquire(request.url()).await?),
            None => None,
        };

        trace!(method = %request.method(), url = %request.url(), "sending request");
        let response = self.client.execute(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse::new(status, headers, body))
    }
}
