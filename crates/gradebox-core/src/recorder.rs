//! Finalizing and persisting the job accumulated from a session's log.

use std::sync::Arc;

use chrono::Utc;
use gradebox_state::{Job, JobStore, StorageError, TeamDirectory};
use tracing::{debug, instrument, warn};

use crate::config::{SubmissionKind, CLIENT_VERSION};
use crate::error::{ClientError, Result};

/// Who ran the session and under which submission kind.
#[derive(Debug, Clone)]
pub struct RecordContext {
    pub username: String,
    pub user_access_key: String,
    pub submission: Option<SubmissionKind>,
    pub custom_tag: Option<String>,
}

impl RecordContext {
    pub fn is_submission(&self) -> bool {
        self.submission.is_some()
    }
}

/// Writes finished jobs to the job store.
#[derive(Clone)]
pub struct JobRecorder {
    store: Arc<dyn JobStore>,
    teams: Arc<dyn TeamDirectory>,
}

impl JobRecorder {
    pub fn new(store: Arc<dyn JobStore>, teams: Arc<dyn TeamDirectory>) -> Self {
        Self { store, teams }
    }

    /// Stamp `job` with identity and submission details and insert it once.
    ///
    /// Graded submissions must resolve a team; without one nothing is stored.
    #[instrument(skip(self, job, ctx), fields(username = %ctx.username, submission = ctx.is_submission()))]
    pub async fn record(&self, job: Option<Job>, ctx: &RecordContext) -> Result<Job> {
        let mut job = job.ok_or(ClientError::RankingUninitialized)?;

        job.updated_at = Utc::now();
        job.is_submission = ctx.is_submission();
        job.submission_tag = ctx
            .submission
            .map(|kind| kind.tag(ctx.custom_tag.as_deref()));
        job.username = ctx.username.clone();
        job.user_access_key = ctx.user_access_key.clone();
        job.client_version = CLIENT_VERSION.to_string();
        job.team_name = self.resolve_team(ctx).await?;

        self.store.insert(&job).await?;
        debug!(job_id = %job.id, inferences = job.inferences.len(), "job recorded");
        Ok(job)
    }

    async fn resolve_team(&self, ctx: &RecordContext) -> Result<Option<String>> {
        match self.teams.find_team(&ctx.username).await {
            Ok(team) => Ok(Some(team)),
            Err(StorageError::TeamNotFound { .. }) | Err(StorageError::AmbiguousTeam { .. })
                if ctx.is_submission() =>
            {
                Err(ClientError::validation("no team name found"))
            }
            Err(e) if ctx.is_submission() => Err(ClientError::Persistence(e)),
            Err(e) => {
                warn!(error = %e, "team lookup failed; recording without a team");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradebox_state::fakes::{MemoryJobStore, MemoryTeamDirectory};

    fn ctx(submission: Option<SubmissionKind>) -> RecordContext {
        RecordContext {
            username: "alice".to_string(),
            user_access_key: "AK".to_string(),
            submission,
            custom_tag: None,
        }
    }

    fn parsed_job() -> Job {
        let mut job = Job::new("session-1");
        job.start_new_inference().correctness = 0.9;
        job
    }

    #[tokio::test]
    async fn stamps_and_inserts_submission() {
        let store = Arc::new(MemoryJobStore::new());
        let teams = Arc::new(MemoryTeamDirectory::new().with_team("alice", "team-rocket"));
        let recorder = JobRecorder::new(store.clone(), teams);

        let job = recorder
            .record(Some(parsed_job()), &ctx(Some(SubmissionKind::M2)))
            .await
            .unwrap();

        assert!(job.is_submission);
        assert_eq!(job.submission_tag.as_deref(), Some("m2"));
        assert_eq!(job.team_name.as_deref(), Some("team-rocket"));
        assert_eq!(job.client_version, CLIENT_VERSION);
        assert!(job.updated_at >= job.created_at);
        assert_eq!(store.jobs().len(), 1);
    }

    #[tokio::test]
    async fn nothing_parsed_is_uninitialized() {
        let store = Arc::new(MemoryJobStore::new());
        let recorder = JobRecorder::new(store.clone(), Arc::new(MemoryTeamDirectory::new()));

        let err = recorder.record(None, &ctx(None)).await.unwrap_err();
        assert!(matches!(err, ClientError::RankingUninitialized));
        assert_eq!(store.insert_count(), 0);
    }

    #[tokio::test]
    async fn adhoc_run_records_without_team() {
        let store = Arc::new(MemoryJobStore::new());
        let recorder = JobRecorder::new(store.clone(), Arc::new(MemoryTeamDirectory::new()));

        let job = recorder.record(Some(parsed_job()), &ctx(None)).await.unwrap();
        assert!(!job.is_submission);
        assert_eq!(job.submission_tag, None);
        assert_eq!(job.team_name, None);
        assert_eq!(store.insert_count(), 1);
    }

    #[tokio::test]
    async fn custom_submission_uses_custom_tag() {
        let store = Arc::new(MemoryJobStore::new());
        let teams = Arc::new(MemoryTeamDirectory::new().with_team("alice", "t"));
        let recorder = JobRecorder::new(store, teams);
        let mut context = ctx(Some(SubmissionKind::Custom));
        context.custom_tag = Some("bonus".to_string());

        let job = recorder.record(Some(parsed_job()), &context).await.unwrap();
        assert_eq!(job.submission_tag.as_deref(), Some("bonus"));
    }

    #[tokio::test]
    async fn storage_failure_surfaces_unwrapped() {
        let store = Arc::new(MemoryJobStore::new());
        store.fail_with("disk full");
        let recorder = JobRecorder::new(store.clone(), Arc::new(MemoryTeamDirectory::new()));

        let err = recorder.record(Some(parsed_job()), &ctx(None)).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Persistence(StorageError::Backend(_))
        ));
        assert_eq!(store.insert_count(), 1);
    }
}
