//! Error taxonomy for the submission client.

use std::path::PathBuf;

use gradebox_state::StorageError;

/// Failures raised by transport collaborators (blob store, broker, pub/sub).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("publish to queue {queue} failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("subscription to {channel} failed: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("broker connection failed: {0}")]
    Connect(String),

    #[error("transport closed: {0}")]
    Closed(String),
}

/// Failures raised while verifying a user profile.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("cannot read profile {path}: {source}")]
    ProfileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse profile {path}: {reason}")]
    ProfileInvalid { path: PathBuf, reason: String },

    #[error("cannot authenticate using the credentials in {path}")]
    Rejected { path: PathBuf },
}

/// Failures raised while packaging a directory.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the submission lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("invalid usage: {0}")]
    FatalUsage(String),

    #[error("ranking uninitialized")]
    RankingUninitialized,

    #[error(transparent)]
    Persistence(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("wait cancelled before the job finished")]
    Cancelled,
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
