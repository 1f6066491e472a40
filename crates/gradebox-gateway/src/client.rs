//! Shared HTTP client for the gateway transports.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::blob::HttpBlobStore;
use crate::broker::HttpBroker;
use crate::config::GatewayConfig;
use crate::pubsub::HttpPubSub;
use crate::Result;
use crate::GatewayError;

const USER_AGENT: &str = concat!("gradebox-gateway/", env!("CARGO_PKG_VERSION"));

/// Entry point: one HTTP client shared by every transport it hands out.
#[derive(Debug, Clone)]
pub struct Gateway {
    inner: Arc<GatewayClient>,
}

#[derive(Debug)]
pub(crate) struct GatewayClient {
    pub(crate) config: GatewayConfig,
    http: reqwest::Client,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(GatewayClient { config, http }),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GatewayConfig::from_env()?)
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn blob_store(&self) -> HttpBlobStore {
        HttpBlobStore::new(self.inner.clone())
    }

    /// Broker for jobs targeting `server_arch`.
    pub fn broker(&self, server_arch: Option<&str>) -> HttpBroker {
        let endpoint = self.inner.config.broker_endpoint(server_arch).clone();
        debug!(endpoint = %endpoint, server_arch = server_arch.unwrap_or("default"), "selected broker");
        HttpBroker::new(self.inner.clone(), endpoint)
    }

    pub fn pubsub(&self) -> HttpPubSub {
        HttpPubSub::new(self.inner.clone())
    }
}

impl GatewayClient {
    /// Request with the gateway token attached.
    pub(crate) fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Request bounded by the configured timeout.
    pub(crate) fn unary(&self, method: Method, url: Url) -> RequestBuilder {
        self.request(method, url).timeout(self.config.timeout)
    }
}

/// Turn a non-success response into [`GatewayError::Status`].
pub(crate) async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}
