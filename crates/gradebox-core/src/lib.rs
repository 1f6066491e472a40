//! Gradebox Core Library
//!
//! Drives a submission session against the hosted build-and-grade service:
//! authenticate, package and upload the project, enqueue the job, stream its
//! log back and record a scored summary.
//!
//! Transports are traits ([`BlobStore`], [`Broker`], [`PubSub`]) so the
//! lifecycle can run against the HTTP gateway or the in-memory [`fakes`].

pub mod archive;
pub mod auth;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod extractor;
pub mod fakes;
pub mod obs;
pub mod output;
pub mod pacing;
pub mod recorder;
pub mod result_stream;
pub mod spec_loader;
pub mod telemetry;
pub mod transport;

pub use archive::{Archiver, TarGzArchiver};
pub use auth::{Authenticator, ProfileAuthenticator};
pub use client::{Collaborators, SessionState, SubmissionClient};
pub use config::{
    default_profile_path, resolve_job_queue, ClientConfig, ClientConfigBuilder, ServiceConfig,
    SubmissionKind, CLIENT_VERSION,
};
pub use domain::{
    BuildSpecification, JobRequest, JobResponse, Profile, QueueMessage, ResponseKind, SessionId,
};
pub use error::{ArchiveError, AuthError, ClientError, Result, TransportError};
pub use extractor::{strip_ansi, TelemetryExtractor};
pub use obs::session_span;
pub use output::{LogRouting, OutputSink, Spinner};
pub use pacing::RateLimiter;
pub use recorder::{JobRecorder, RecordContext};
pub use result_stream::{EchoSettings, ResultStream};
pub use telemetry::init_tracing;
pub use transport::{
    BlobStore, Broker, PubSub, Subscription, TransportResult, TransportSession, UploadOptions,
};

pub use gradebox_state::{Inference, Job, JobStore, TeamDirectory};
