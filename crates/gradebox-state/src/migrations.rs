//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with their indexes. Safe to call multiple times.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Gradebox tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Gradebox SurrealDB schema");

    init_jobs_table(db).await?;
    init_teams_table(db).await?;

    info!("Gradebox schema initialization complete");
    Ok(())
}

/// Initialize `jobs` table
///
/// Schema:
/// ```text
/// TABLE jobs {
///   job_id:          STRING (unique, the session ID)
///   username:        STRING (indexed)
///   user_access_key: STRING
///   team_name:       STRING?
///   submission_tag:  STRING? (indexed)
///   is_submission:   BOOL
///   client_version:  STRING
///   inferences:      ARRAY<OBJECT>
///   project_url:     STRING?
///   created_at:      DATETIME
///   updated_at:      DATETIME
/// }
/// ```
///
/// Rows are written once and never updated.
async fn init_jobs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing jobs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS jobs AS
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR read FULL
                FOR update NONE
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_job_id ON TABLE jobs COLUMNS job_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_job_username ON TABLE jobs COLUMNS username;
        DEFINE INDEX IF NOT EXISTS idx_job_tag ON TABLE jobs COLUMNS submission_tag;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}

/// Initialize `teams` table
///
/// Lookups filter on `userid` and `current`.
async fn init_teams_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing teams table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS teams SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_team_user ON TABLE teams COLUMNS userid, current;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}
