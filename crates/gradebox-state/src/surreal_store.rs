//! SurrealDB-backed JobStore and TeamDirectory implementation
//!
//! Uses `schema::JobRow` and `schema::TeamRow` for persistence,
//! converting to/from `storage_traits` types at the boundary.

use std::path::Path;

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::{self, CloudConfig};
use crate::schema::{JobRow, TeamRow};
use crate::storage_traits::{Job, JobStore, StorageResult, TeamDirectory, TeamRecord};

/// SurrealDB-backed implementation of [`JobStore`] and [`TeamDirectory`].
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Surreal<Any>,
}

impl SurrealJobStore {
    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_in_memory().await?;
        info!("SurrealJobStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to SurrealDB Cloud.
    pub async fn cloud(config: &CloudConfig) -> crate::Result<Self> {
        let db = handle::connect_cloud(config).await?;
        info!("SurrealJobStore connected (cloud)");
        Ok(Self { db })
    }

    /// Create from environment variables, falling back to `local_dir`.
    pub async fn from_env(local_dir: &Path) -> crate::Result<Self> {
        let db = handle::connect_from_env(local_dir).await?;
        Ok(Self { db })
    }

    /// Add a team membership row.
    #[instrument(skip(self, team), fields(userid = %team.userid))]
    pub async fn add_team(&self, team: &TeamRecord) -> StorageResult<()> {
        let _created: Option<TeamRow> = self
            .db
            .create("teams")
            .content(TeamRow::from(team))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for SurrealJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert(&self, job: &Job) -> StorageResult<()> {
        if self.get(&job.id).await?.is_some() {
            return Err(StorageError::DuplicateJob { id: job.id.clone() });
        }

        let created: Option<JobRow> = self
            .db
            .create("jobs")
            .content(JobRow::from(job))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match created {
            Some(_) => {
                debug!("job record inserted");
                Ok(())
            }
            None => Err(StorageError::Backend(format!(
                "insert of job {} returned no record",
                job.id
            ))),
        }
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Job>> {
        let id_owned = id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM jobs WHERE job_id = $id")
            .bind(("id", id_owned))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<JobRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(rows.into_iter().next().map(JobRow::into_job))
    }

    async fn ping(&self) -> StorageResult<()> {
        self.db
            .health()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl TeamDirectory for SurrealJobStore {
    #[instrument(skip(self))]
    async fn find_team(&self, username: &str) -> StorageResult<String> {
        let uid = username.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM teams WHERE userid = $uid AND current = true")
            .bind(("uid", uid))
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let rows: Vec<TeamRow> = res
            .take(0)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match rows.len() {
            0 => Err(StorageError::TeamNotFound {
                username: username.to_string(),
            }),
            1 => Ok(rows[0].teamname.clone()),
            count => Err(StorageError::AmbiguousTeam {
                username: username.to_string(),
                count,
            }),
        }
    }
}
