//! Gradebox-State: SurrealDB persistence for Gradebox
//!
//! This crate owns the records a submission run leaves behind and the
//! lookups the client needs while recording them.
//!
//! ## Key Components
//!
//! - `Job` / `Inference`: The structured summary of one remote run
//! - `JobStore`: Write-once persistence of finished jobs
//! - `TeamDirectory`: Username to current team resolution
//! - `SurrealJobStore`: SurrealDB implementation of both traits

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, DEFAULT_DATABASE, DEFAULT_NAMESPACE};
pub use storage_traits::{
    Inference, Job, JobStore, StorageResult, TeamDirectory, TeamRecord,
};
pub use surreal_store::SurrealJobStore;

/// Result type for gradebox-state operations
pub type Result<T> = std::result::Result<T, StateError>;
