//! Wire entities exchanged with the job queue and the log channel.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::build_spec::BuildSpecification;
use super::profile::{Profile, User};
use super::session::SessionId;

/// Header keys of a queued job message.
pub mod header_keys {
    pub const ID: &str = "id";
    pub const UPLOAD_KEY: &str = "upload_key";
    pub const USERNAME: &str = "username";
    pub const USER_ACCESS_KEY: &str = "user_access_key";
    pub const USER_SECRET_KEY: &str = "user_secret_key";
}

/// Body of a queued job message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub client_version: String,
    pub upload_key: String,
    pub user: User,
    pub build_specification: BuildSpecification,
}

/// Message handed to the broker.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub header: BTreeMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl QueueMessage {
    /// Build the message for `request`. The header carries the user's keys so
    /// the remote executor can act on their behalf.
    pub fn for_request(
        id: &SessionId,
        request: &JobRequest,
        profile: &Profile,
    ) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(request)?;
        let header = BTreeMap::from([
            (header_keys::ID.to_string(), id.to_string()),
            (header_keys::UPLOAD_KEY.to_string(), request.upload_key.clone()),
            (header_keys::USERNAME.to_string(), profile.username.clone()),
            (
                header_keys::USER_ACCESS_KEY.to_string(),
                profile.access_key.clone(),
            ),
            (
                header_keys::USER_SECRET_KEY.to_string(),
                profile.secret_key.clone(),
            ),
        ]);
        Ok(Self {
            id: id.to_string(),
            header,
            body,
        })
    }

    pub fn request(&self) -> Result<JobRequest, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

impl std::fmt::Debug for QueueMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMessage")
            .field("id", &self.id)
            .field("header_keys", &self.header.keys().collect::<Vec<_>>())
            .field("body_len", &self.body.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Stdout,
    Stderr,
}

/// One chunk of the remote executor's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResponse {
    pub kind: ResponseKind,
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl JobResponse {
    pub fn new(kind: ResponseKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn stdout(body: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseKind::Stdout, body)
    }

    pub fn stderr(body: impl Into<Vec<u8>>) -> Self {
        Self::new(ResponseKind::Stderr, body)
    }

    /// The body as text with surrounding whitespace trimmed.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).trim().to_string()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
