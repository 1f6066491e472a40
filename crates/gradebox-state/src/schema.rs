//! Schema definitions for Gradebox SurrealDB tables
//!
//! Tables:
//! - jobs: Finished job records, one row per session
//! - teams: Team membership rows used for team-name resolution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage_traits::{Inference, Job, TeamRecord};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Inference row, durations stored as whole nanoseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRow {
    pub correctness: f64,
    pub model: String,
    pub op_runtime_ns: u64,
    pub user_full_runtime_ns: u64,
    pub system_full_runtime_ns: u64,
    pub elapsed_full_runtime_ns: u64,
}

impl From<&Inference> for InferenceRow {
    fn from(inf: &Inference) -> Self {
        InferenceRow {
            correctness: inf.correctness,
            model: inf.model.clone(),
            op_runtime_ns: nanos(inf.op_runtime),
            user_full_runtime_ns: nanos(inf.user_full_runtime),
            system_full_runtime_ns: nanos(inf.system_full_runtime),
            elapsed_full_runtime_ns: nanos(inf.elapsed_full_runtime),
        }
    }
}

impl InferenceRow {
    pub fn into_inference(self) -> Inference {
        Inference {
            correctness: self.correctness,
            model: self.model,
            op_runtime: std::time::Duration::from_nanos(self.op_runtime_ns),
            user_full_runtime: std::time::Duration::from_nanos(self.user_full_runtime_ns),
            system_full_runtime: std::time::Duration::from_nanos(self.system_full_runtime_ns),
            elapsed_full_runtime: std::time::Duration::from_nanos(self.elapsed_full_runtime_ns),
        }
    }
}

fn nanos(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Job row - one finished submission run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    /// Session ID (unique)
    pub job_id: String,
    pub username: String,
    pub user_access_key: String,
    pub team_name: Option<String>,
    pub submission_tag: Option<String>,
    pub is_submission: bool,
    pub client_version: String,
    pub inferences: Vec<InferenceRow>,
    pub project_url: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        JobRow {
            id: None,
            job_id: job.id.clone(),
            username: job.username.clone(),
            user_access_key: job.user_access_key.clone(),
            team_name: job.team_name.clone(),
            submission_tag: job.submission_tag.clone(),
            is_submission: job.is_submission,
            client_version: job.client_version.clone(),
            inferences: job.inferences.iter().map(InferenceRow::from).collect(),
            project_url: job.project_url.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

impl JobRow {
    pub fn into_job(self) -> Job {
        Job {
            id: self.job_id,
            username: self.username,
            user_access_key: self.user_access_key,
            team_name: self.team_name,
            submission_tag: self.submission_tag,
            is_submission: self.is_submission,
            client_version: self.client_version,
            inferences: self
                .inferences
                .into_iter()
                .map(InferenceRow::into_inference)
                .collect(),
            project_url: self.project_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Team row - membership of a user in a team for a class
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRow {
    #[serde(default, skip_serializing)]
    pub id: Option<surrealdb::sql::Thing>,
    pub userid: String,
    pub teamname: String,
    pub class: String,
    pub current: bool,
}

impl From<&TeamRecord> for TeamRow {
    fn from(team: &TeamRecord) -> Self {
        TeamRow {
            id: None,
            userid: team.userid.clone(),
            teamname: team.teamname.clone(),
            class: team.class.clone(),
            current: team.current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn job_row_preserves_inference_timings() {
        let mut job = Job::new("session-1");
        let inf = job.start_new_inference();
        inf.correctness = 0.92;
        inf.model = "resnet50".to_string();
        inf.user_full_runtime = Duration::from_millis(4850);

        let back = JobRow::from(&job).into_job();
        assert_eq!(back.id, "session-1");
        assert_eq!(back.inferences[0].model, "resnet50");
        assert_eq!(back.inferences[0].user_full_runtime, Duration::from_millis(4850));
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(nanos(Duration::MAX), u64::MAX);
    }
}
