//! Storage trait definitions for Gradebox
//!
//! These traits define the persistence boundary of the submission client:
//! - `JobStore`: Write-once persistence of finished job records
//! - `TeamDirectory`: Resolution of a username to its current team name
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Job records
// ---------------------------------------------------------------------------

/// One measured sub-run inside a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Correctness score reported by the program
    pub correctness: f64,
    /// Model identifier reported alongside the score
    pub model: String,
    /// Sum of all operator timings observed for this inference
    pub op_runtime: Duration,
    /// User CPU time of the full run
    pub user_full_runtime: Duration,
    /// System CPU time of the full run
    pub system_full_runtime: Duration,
    /// Wall-clock time of the full run
    pub elapsed_full_runtime: Duration,
}

/// Structured summary of one remote run, accumulated from its log stream.
///
/// At most one inference is "current": the last one in `inferences`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Session ID of the run that produced this record
    pub id: String,
    pub username: String,
    pub user_access_key: String,
    pub team_name: Option<String>,
    pub submission_tag: Option<String>,
    pub is_submission: bool,
    pub client_version: String,
    pub inferences: Vec<Inference>,
    pub project_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an empty job record for the given session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            username: String::new(),
            user_access_key: String::new(),
            team_name: None,
            submission_tag: None,
            is_submission: false,
            client_version: String::new(),
            inferences: Vec::new(),
            project_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a fresh inference and make it current.
    pub fn start_new_inference(&mut self) -> &mut Inference {
        self.inferences.push(Inference::default());
        let last = self.inferences.len() - 1;
        &mut self.inferences[last]
    }

    /// The inference metric lines currently attribute to, if any.
    pub fn current_inference(&self) -> Option<&Inference> {
        self.inferences.last()
    }

    pub fn current_inference_mut(&mut self) -> Option<&mut Inference> {
        self.inferences.last_mut()
    }

    /// The current inference, starting the first one if none exists yet.
    pub fn current_or_first_inference(&mut self) -> &mut Inference {
        if self.inferences.is_empty() {
            return self.start_new_inference();
        }
        let last = self.inferences.len() - 1;
        &mut self.inferences[last]
    }

    /// Add an operator timing to the current inference. The total saturates
    /// at `Duration::MAX`.
    pub fn record_op_runtime(&mut self, elapsed: Duration) {
        let inference = self.current_or_first_inference();
        inference.op_runtime = inference.op_runtime.saturating_add(elapsed);
    }
}

/// Team membership row used for team-name resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub userid: String,
    pub teamname: String,
    pub class: String,
    /// Only current rows take part in lookups
    pub current: bool,
}

// ---------------------------------------------------------------------------
// JobStore
// ---------------------------------------------------------------------------

/// Write-once store for finished job records.
///
/// Guarantees:
/// - `insert` is all-or-nothing: either the whole record is stored or none of it.
/// - A job id can be inserted at most once.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a finished job record.
    async fn insert(&self, job: &Job) -> StorageResult<()>;

    /// Fetch a job record by id.
    async fn get(&self, id: &str) -> StorageResult<Option<Job>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// TeamDirectory
// ---------------------------------------------------------------------------

/// Lookup of the team a user currently belongs to.
#[async_trait]
pub trait TeamDirectory: Send + Sync {
    /// Resolve the current team name for `username`.
    ///
    /// Returns `StorageError::TeamNotFound` when the user has no current team
    /// and `StorageError::AmbiguousTeam` when more than one row matches.
    async fn find_team(&self, username: &str) -> StorageResult<String>;
}
