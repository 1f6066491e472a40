//! Capability interfaces of the services a session talks to.
//!
//! - `BlobStore`: object storage for the project archive
//! - `Broker`: the job queue
//! - `PubSub`: the per-session log channel
//!
//! Implementations live outside this crate (see `gradebox-gateway`);
//! in-memory versions for tests are in [`crate::fakes`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::{QueueMessage, SessionId};
use crate::error::TransportError;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Signed transport session established during validation.
///
/// Upload and publish calls act on behalf of the user it was issued for.
#[derive(Clone)]
pub struct TransportSession {
    pub session_id: SessionId,
    pub access_key: String,
    pub secret_key: String,
    pub issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("session_id", &self.session_id)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// Per-object upload settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub expires_at: DateTime<Utc>,
    pub content_type: String,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `body` under `key`. Returns the key the object is reachable at.
    async fn upload(
        &self,
        session: &TransportSession,
        body: Vec<u8>,
        key: &str,
        options: UploadOptions,
    ) -> TransportResult<String>;
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(&self) -> TransportResult<()>;

    async fn publish(
        &self,
        session: &TransportSession,
        queue: &str,
        message: QueueMessage,
    ) -> TransportResult<()>;

    async fn disconnect(&self) -> TransportResult<()>;
}

#[async_trait]
pub trait PubSub: Send + Sync {
    /// Start receiving raw messages published on `channel`.
    async fn subscribe(&self, channel: &str) -> TransportResult<Subscription>;

    /// Close the underlying connection. Must be idempotent.
    async fn close(&self) -> TransportResult<()>;
}

/// A live channel subscription.
///
/// The receiver yields raw message payloads until the publisher closes the
/// channel or the subscription is stopped.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    messages: mpsc::Receiver<Vec<u8>>,
    stop: CancellationToken,
}

impl Subscription {
    pub fn new(
        channel: impl Into<String>,
        messages: mpsc::Receiver<Vec<u8>>,
        stop: CancellationToken,
    ) -> Self {
        Self {
            channel: channel.into(),
            messages,
            stop,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Handle that stops this subscription. Stopping twice is a no-op.
    pub fn stop_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    pub fn into_parts(self) -> (String, mpsc::Receiver<Vec<u8>>, CancellationToken) {
        (self.channel, self.messages, self.stop)
    }
}
