//! In-memory fakes for the session's collaborators (testing only)
//!
//! - `StaticAuthenticator`: returns a fixed profile and verdict
//! - `MemoryBlobStore`: keeps uploaded objects in a map
//! - `MemoryBroker`: records connects, publishes and disconnects
//! - `MemoryPubSub`: replays scripted responses on every subscription

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::Authenticator;
use crate::domain::{JobResponse, Profile, QueueMessage};
use crate::error::{AuthError, TransportError};
use crate::transport::{
    BlobStore, Broker, PubSub, Subscription, TransportResult, TransportSession, UploadOptions,
};

// ---------------------------------------------------------------------------
// StaticAuthenticator
// ---------------------------------------------------------------------------

/// Authenticator that ignores the file system.
#[derive(Debug)]
pub struct StaticAuthenticator {
    profile: Profile,
    ok: bool,
    calls: Mutex<Vec<PathBuf>>,
}

impl StaticAuthenticator {
    /// Accepts every profile path and returns `profile`.
    pub fn accepting(profile: Profile) -> Self {
        Self {
            profile,
            ok: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(profile: Profile) -> Self {
        Self {
            ok: false,
            ..Self::accepting(profile)
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn verify(&self, path: &Path) -> Result<(Profile, bool), AuthError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        Ok((self.profile.clone(), self.ok))
    }
}

// ---------------------------------------------------------------------------
// MemoryBlobStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub options: UploadOptions,
    pub uploaded_by: String,
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        session: &TransportSession,
        body: Vec<u8>,
        key: &str,
        options: UploadOptions,
    ) -> TransportResult<String> {
        if let Some(reason) = self.fail_with.lock().unwrap().clone() {
            return Err(TransportError::Upload {
                key: key.to_string(),
                reason,
            });
        }
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                body,
                options,
                uploaded_by: session.access_key.clone(),
            },
        );
        Ok(key.to_string())
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BrokerState {
    connects: usize,
    disconnects: usize,
    published: Vec<(String, QueueMessage)>,
    fail_connect: Option<String>,
    fail_publish: Option<String>,
}

/// Broker that records what it was asked to do.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_connect = Some(message.into());
    }

    pub fn fail_publish(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_publish = Some(message.into());
    }

    /// `(queue, message)` pairs in publish order.
    pub fn published(&self) -> Vec<(String, QueueMessage)> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.state.lock().unwrap().disconnects
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_connect.clone() {
            return Err(TransportError::Connect(reason));
        }
        state.connects += 1;
        Ok(())
    }

    async fn publish(
        &self,
        _session: &TransportSession,
        queue: &str,
        message: QueueMessage,
    ) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_publish.clone() {
            return Err(TransportError::Publish {
                queue: queue.to_string(),
                reason,
            });
        }
        state.published.push((queue.to_string(), message));
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.state.lock().unwrap().disconnects += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryPubSub
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PubSubState {
    script: Vec<Vec<u8>>,
    keep_open: bool,
    open: HashMap<String, mpsc::Sender<Vec<u8>>>,
    subscriptions: Vec<(String, CancellationToken)>,
    closes: usize,
    fail_subscribe: Option<String>,
}

/// Pub/sub that replays a script on every subscription.
///
/// After replaying, the channel is closed unless [`keep_open`](Self::keep_open)
/// was requested; open channels can be fed with [`send`](Self::send) and
/// closed with [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct MemoryPubSub {
    state: Mutex<PubSubState>,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, responses: impl IntoIterator<Item = JobResponse>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for response in responses {
                state
                    .script
                    .push(response.to_bytes().expect("response serializes"));
            }
        }
        self
    }

    /// Append an undecodable payload to the script.
    pub fn with_raw(self, raw: impl Into<Vec<u8>>) -> Self {
        self.state.lock().unwrap().script.push(raw.into());
        self
    }

    pub fn keep_open(self) -> Self {
        self.state.lock().unwrap().keep_open = true;
        self
    }

    pub fn fail_subscribe(&self, message: impl Into<String>) {
        self.state.lock().unwrap().fail_subscribe = Some(message.into());
    }

    /// Publish a response on an open channel. Returns false if it is closed.
    pub async fn send(&self, channel: &str, response: JobResponse) -> bool {
        let sender = self.state.lock().unwrap().open.get(channel).cloned();
        match sender {
            Some(tx) => tx
                .send(response.to_bytes().expect("response serializes"))
                .await
                .is_ok(),
            None => false,
        }
    }

    /// Close an open channel, ending its subscription's stream.
    pub fn finish(&self, channel: &str) {
        self.state.lock().unwrap().open.remove(channel);
    }

    /// Channels subscribed so far, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Whether every subscription handed out has been stopped.
    pub fn all_stopped(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .all(|(_, stop)| stop.is_cancelled())
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn subscribe(&self, channel: &str) -> TransportResult<Subscription> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = state.fail_subscribe.clone() {
            return Err(TransportError::Subscribe {
                channel: channel.to_string(),
                reason,
            });
        }

        let (tx, rx) = mpsc::channel(state.script.len() + 16);
        for raw in &state.script {
            tx.try_send(raw.clone()).expect("capacity covers script");
        }
        if state.keep_open {
            state.open.insert(channel.to_string(), tx);
        }

        let stop = CancellationToken::new();
        state
            .subscriptions
            .push((channel.to_string(), stop.clone()));
        Ok(Subscription::new(channel, rx, stop))
    }

    async fn close(&self) -> TransportResult<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.open.clear();
        Ok(())
    }
}
