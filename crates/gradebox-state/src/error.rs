//! Error types for gradebox-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the [`JobStore`](crate::JobStore) and
/// [`TeamDirectory`](crate::TeamDirectory) traits
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend rejected or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// The backend could not be reached
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A record could not be converted to or from its stored form
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A job with the same id was already recorded
    #[error("job {id} has already been recorded")]
    DuplicateJob { id: String },

    /// No current team row exists for the user
    #[error("no team entry for {username}")]
    TeamNotFound { username: String },

    /// More than one current team row exists for the user
    #[error("more than one team entry for {username} (found {count})")]
    AmbiguousTeam { username: String, count: usize },
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Connection(msg) => StorageError::Unavailable(msg),
            StateError::Serialization(msg) => StorageError::Serialization(msg),
            other => StorageError::Backend(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
