//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryJobStore` and `MemoryTeamDirectory` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryJobStore
// ---------------------------------------------------------------------------

/// In-memory job store backed by a `HashMap<id, Job>`.
///
/// `insert_count` lets tests assert how many inserts were attempted,
/// including rejected ones.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
    attempts: Mutex<usize>,
    fail_with: Mutex<Option<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `insert` and `ping` fail with a backend error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Number of `insert` calls made so far.
    pub fn insert_count(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    /// Snapshot of all stored jobs.
    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &Job) -> StorageResult<()> {
        *self.attempts.lock().unwrap() += 1;
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(StorageError::Backend(message));
        }
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(StorageError::DuplicateJob { id: job.id.clone() });
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn ping(&self) -> StorageResult<()> {
        match self.fail_with.lock().unwrap().clone() {
            Some(message) => Err(StorageError::Unavailable(message)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryTeamDirectory
// ---------------------------------------------------------------------------

/// In-memory team directory backed by a list of `TeamRecord` rows.
#[derive(Debug, Default)]
pub struct MemoryTeamDirectory {
    rows: Mutex<Vec<TeamRecord>>,
}

impl MemoryTeamDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a current team row for `userid`.
    pub fn with_team(self, userid: &str, teamname: &str) -> Self {
        self.add(TeamRecord {
            userid: userid.to_string(),
            teamname: teamname.to_string(),
            class: String::new(),
            current: true,
        });
        self
    }

    pub fn add(&self, row: TeamRecord) {
        self.rows.lock().unwrap().push(row);
    }
}

#[async_trait]
impl TeamDirectory for MemoryTeamDirectory {
    async fn find_team(&self, username: &str) -> StorageResult<String> {
        let rows = self.rows.lock().unwrap();
        let matches: Vec<&TeamRecord> = rows
            .iter()
            .filter(|r| r.current && r.userid == username)
            .collect();
        match matches.as_slice() {
            [] => Err(StorageError::TeamNotFound {
                username: username.to_string(),
            }),
            [only] => Ok(only.teamname.clone()),
            many => Err(StorageError::AmbiguousTeam {
                username: username.to_string(),
                count: many.len(),
            }),
        }
    }
}
