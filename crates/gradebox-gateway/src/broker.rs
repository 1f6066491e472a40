//! Job queue over HTTP.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gradebox_core::{Broker, QueueMessage, TransportError, TransportResult, TransportSession};
use reqwest::Method;
use tracing::{debug, instrument};
use url::Url;

use crate::client::{check, GatewayClient};
use crate::config::url_for;

/// Broker that posts job requests to `POST /v1/queues/{queue}/messages`.
///
/// `connect` probes `GET /v1/health`; `disconnect` only forgets the
/// connection since HTTP keeps no session open.
#[derive(Debug)]
pub struct HttpBroker {
    client: Arc<GatewayClient>,
    endpoint: Url,
    connected: AtomicBool,
}

impl HttpBroker {
    pub(crate) fn new(client: Arc<GatewayClient>, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            connected: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for HttpBroker {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> TransportResult<()> {
        let url = url_for(&self.endpoint, &["v1", "health"])
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let response = self
            .client
            .unary(Method::GET, url)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        check(response)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        self.connected.store(true, Ordering::SeqCst);
        debug!("broker reachable");
        Ok(())
    }

    #[instrument(skip(self, _session, message), fields(endpoint = %self.endpoint, message_id = %message.id))]
    async fn publish(
        &self,
        _session: &TransportSession,
        queue: &str,
        message: QueueMessage,
    ) -> TransportResult<()> {
        let failed = |reason: String| TransportError::Publish {
            queue: queue.to_string(),
            reason,
        };
        let url = url_for(&self.endpoint, &["v1", "queues", queue, "messages"])
            .map_err(|e| failed(e.to_string()))?;
        let response = self
            .client
            .unary(Method::POST, url)
            .json(&message)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        check(response).await.map_err(|e| failed(e.to_string()))?;
        debug!(queue = %queue, "job request enqueued");
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!(endpoint = %self.endpoint, "broker disconnected");
        }
        Ok(())
    }
}
