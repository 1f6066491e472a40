//! The submission lifecycle.
//!
//! A [`SubmissionClient`] drives one session through
//! `validate → upload → publish → subscribe → connect → wait → disconnect`
//! and optionally `record_job`. Each step requires its predecessors to have
//! succeeded; a failing step leaves the session where it was so the caller
//! can still tear it down with [`SubmissionClient::disconnect`].

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use chrono::Utc;
use colored::Colorize;
use gradebox_state::{Job, JobStore, TeamDirectory};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::archive::{self, Archiver};
use crate::auth::Authenticator;
use crate::config::{resolve_job_queue, ClientConfig, ServiceConfig, CLIENT_VERSION};
use crate::domain::{BuildSpecification, JobRequest, Profile, QueueMessage, SessionId};
use crate::error::{AuthError, ClientError, Result, TransportError};
use crate::obs;
use crate::output::Spinner;
use crate::pacing::RateLimiter;
use crate::recorder::{JobRecorder, RecordContext};
use crate::result_stream::{EchoSettings, ResultStream};
use crate::spec_loader::{self, SpecSource};
use crate::transport::{BlobStore, Broker, PubSub, TransportSession, UploadOptions};

/// External services a session depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub authenticator: Arc<dyn Authenticator>,
    pub archiver: Arc<dyn Archiver>,
    pub blob_store: Arc<dyn BlobStore>,
    pub broker: Arc<dyn Broker>,
    pub pubsub: Arc<dyn PubSub>,
    pub jobs: Arc<dyn JobStore>,
    pub teams: Arc<dyn TeamDirectory>,
}

/// Furthest lifecycle step a session has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Created,
    Validated,
    Uploaded,
    Published,
    Subscribed,
    Connected,
    Completed,
    Disconnected,
    Recorded,
}

/// One submission session.
pub struct SubmissionClient {
    id: SessionId,
    service: ServiceConfig,
    config: ClientConfig,
    deps: Collaborators,
    pacer: RateLimiter,
    state: SessionState,
    profile: Option<Profile>,
    build_spec: Option<BuildSpecification>,
    transport: Option<TransportSession>,
    upload_key: Option<String>,
    spinner: Option<Spinner>,
    stream: Option<ResultStream>,
    pubsub_open: bool,
    connected: bool,
    torn_down: bool,
    job: Option<Job>,
    started: Instant,
}

impl SubmissionClient {
    pub fn new(service: ServiceConfig, config: ClientConfig, deps: Collaborators) -> Self {
        let id = SessionId::new();
        obs::emit_session_created(id.as_str(), &service.app_name);
        Self {
            id,
            pacer: RateLimiter::new(config.rate_limit),
            service,
            config,
            deps,
            state: SessionState::Created,
            profile: None,
            build_spec: None,
            transport: None,
            upload_key: None,
            spinner: None,
            stream: None,
            pubsub_open: false,
            connected: false,
            torn_down: false,
            job: None,
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn build_spec(&self) -> Option<&BuildSpecification> {
        self.build_spec.as_ref()
    }

    pub fn upload_key(&self) -> Option<&str> {
        self.upload_key.as_deref()
    }

    /// The job handed over by the log stream. Only set once `wait` returned.
    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Queue the job is published to, resolved from the current session state.
    pub fn job_queue_name(&self) -> String {
        let derived = self
            .build_spec
            .as_ref()
            .and_then(|spec| spec.derived_queue_name(&self.service.app_name));
        resolve_job_queue(
            self.config.job_queue_name.as_deref(),
            derived.as_deref(),
            &self.service.default_job_queue_name(),
        )
    }

    /// Fail with `FatalUsage` unless the session is in one of `allowed`
    /// and has not been torn down.
    fn require_state(&self, step: &str, allowed: RangeInclusive<SessionState>) -> Result<()> {
        if self.torn_down || !allowed.contains(&self.state) {
            error!(step, state = ?self.state, "lifecycle step called out of order");
            return Err(ClientError::FatalUsage(format!(
                "{} cannot run in state {:?}{}",
                step,
                self.state,
                if self.torn_down { " after disconnect" } else { "" }
            )));
        }
        Ok(())
    }

    /// Authenticate, check eligibility, load the build specification and
    /// establish the transport session.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn validate(&mut self) -> Result<()> {
        self.require_state("validate", SessionState::Created..=SessionState::Created)?;
        let stdout = self.config.stdout.clone();
        stdout.success("Checking your authentication credentials.");

        let profile_path = self.config.profile_path.clone();
        let (profile, ok) = self.deps.authenticator.verify(&profile_path).await?;
        if !ok {
            return Err(AuthError::Rejected { path: profile_path }.into());
        }

        if let Some(kind) = self.config.submission {
            let marker = &self.service.course_role_marker;
            if !profile.has_role(marker) {
                return Err(ClientError::validation(format!(
                    "the profile for {} cannot make {} submissions: a role containing \"{}\" is required",
                    profile.username, kind, marker
                )));
            }
        }

        let loaded = spec_loader::load(&self.config)?;
        if let SpecSource::Embedded(_) = loaded.source {
            stdout.write_line(
                &format!(
                    "✱ Using the following build file for submission:\n{}",
                    loaded.raw
                )
                .yellow()
                .to_string(),
            );
        }

        if self.config.is_submission() {
            spec_loader::check_submit_requirements(
                &self.config.directory,
                &self.service.submit_requirements,
            )?;
        }

        let mut spec = loaded.spec;
        if let Some(queue) = spec.derived_queue_name(&self.service.app_name) {
            debug!(queue = %queue, "inferred queue from build file; may be overridden");
        }
        if spec.backfill_push_credentials(profile.dockerhub.as_ref()) {
            debug!("filled docker push credentials from profile");
        }

        let transport = TransportSession {
            session_id: self.id.clone(),
            access_key: profile.access_key.clone(),
            secret_key: profile.secret_key.clone(),
            issued_at: Utc::now(),
        };

        if self.config.is_submission() {
            if let Err(e) = self.deps.jobs.ping().await {
                error!(error = %e, "unable to contact submission database");
                return Err(ClientError::Persistence(e));
            }
        }

        obs::emit_session_validated(
            self.id.as_str(),
            &profile.username,
            self.config.submission.map(|k| k.as_str()),
        );
        self.profile = Some(profile);
        self.build_spec = Some(spec);
        self.transport = Some(transport);
        self.state = SessionState::Validated;
        Ok(())
    }

    /// Package the project directory and upload it.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn upload(&mut self) -> Result<()> {
        self.require_state("upload", SessionState::Validated..=SessionState::Validated)?;
        let Some(transport) = self.transport.clone() else {
            return Err(ClientError::FatalUsage(
                "upload requires a transport session; call validate first".to_string(),
            ));
        };
        let stdout = self.config.stdout.clone();
        stdout.progress("Preparing your project directory for upload.");

        let dir = self.config.directory.clone();
        if !dir.is_dir() {
            return Err(ClientError::validation(format!(
                "directory {} not found",
                dir.display()
            )));
        }

        let archiver = self.deps.archiver.clone();
        let body = tokio::task::spawn_blocking({
            let archiver = archiver.clone();
            move || archiver.archive(&dir)
        })
        .await
        .map_err(|e| ClientError::io("archiving task failed", std::io::Error::other(e)))??;

        stdout.progress("Uploading your project directory. This may take a few minutes.");

        let key = self.id.upload_key(
            &self.service.upload_destination_directory,
            archiver.extension(),
        );
        let retention = self.service.retention_for(self.config.is_submission());
        let retention = chrono::Duration::from_std(retention)
            .map_err(|e| ClientError::Config(format!("invalid upload retention: {}", e)))?;
        let username = self
            .profile
            .as_ref()
            .map(|p| p.username.clone())
            .unwrap_or_default();
        let metadata = BTreeMap::from([
            ("id".to_string(), self.id.to_string()),
            ("type".to_string(), "user_upload".to_string()),
            ("username".to_string(), username),
            ("created_at".to_string(), Utc::now().to_rfc3339()),
            ("sha256".to_string(), archive::digest(&body)),
        ]);
        let options = UploadOptions {
            expires_at: Utc::now() + retention,
            content_type: archiver.mime_type().to_string(),
            metadata,
        };

        let size = body.len();
        self.pacer.acquire().await;
        let stored = self
            .deps
            .blob_store
            .upload(&transport, body, &key, options)
            .await?;

        stdout.success("Folder uploaded. Server is now processing your submission.");
        obs::emit_session_uploaded(self.id.as_str(), &stored, size);
        self.upload_key = Some(stored);
        self.state = SessionState::Uploaded;
        Ok(())
    }

    /// Enqueue the job request.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn publish(&mut self) -> Result<()> {
        self.require_state("publish", SessionState::Uploaded..=SessionState::Uploaded)?;
        let Some(upload_key) = self.upload_key.clone().filter(|k| !k.is_empty()) else {
            return Err(ClientError::FatalUsage(
                "publish requires an upload key; call upload first".to_string(),
            ));
        };
        let (Some(profile), Some(spec), Some(transport)) = (
            self.profile.as_ref(),
            self.build_spec.as_ref(),
            self.transport.as_ref(),
        ) else {
            return Err(ClientError::FatalUsage(
                "publish requires a validated session".to_string(),
            ));
        };

        let request = JobRequest {
            id: self.id.to_string(),
            created_at: Utc::now(),
            client_version: CLIENT_VERSION.to_string(),
            upload_key,
            user: profile.user(),
            build_specification: spec.clone(),
        };
        let message = QueueMessage::for_request(&self.id, &request, profile)?;
        let queue = self.job_queue_name();
        debug!(queue = %queue, "submitting job request");

        self.pacer.acquire().await;
        self.deps.broker.publish(transport, &queue, message).await?;

        self.config
            .stdout
            .success("Your job request has been posted to the queue.");
        self.spinner = Some(Spinner::start(
            &self.config.stdout,
            "Waiting for the server to process your request...",
        ));
        obs::emit_session_published(self.id.as_str(), &queue);
        self.state = SessionState::Published;
        Ok(())
    }

    /// Subscribe to the session's log channel and start consuming it.
    ///
    /// Can be called more than once; every subscription feeds the same job.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn subscribe(&mut self) -> Result<()> {
        self.require_state("subscribe", SessionState::Published..=SessionState::Connected)?;
        let channel = self.id.log_channel(&self.service.app_name);
        let subscription = self.deps.pubsub.subscribe(&channel).await?;
        self.pubsub_open = true;

        if self.stream.is_none() {
            let echo = EchoSettings {
                stdout: self.config.stdout.clone(),
                stderr: self.config.stderr.clone(),
                routing: self.config.routing,
                verbose: self.config.verbose,
            };
            self.stream = Some(ResultStream::start(
                self.id.to_string(),
                echo,
                self.spinner.take(),
            ));
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.attach(subscription)?;
        }

        obs::emit_session_subscribed(self.id.as_str(), &channel);
        self.state = self.state.max(SessionState::Subscribed);
        Ok(())
    }

    /// Connect the broker.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn connect(&mut self) -> Result<()> {
        self.require_state("connect", SessionState::Published..=SessionState::Subscribed)?;
        self.deps.broker.connect().await?;
        self.connected = true;
        self.state = self.state.max(SessionState::Connected);
        Ok(())
    }

    /// Block until the log stream completes or `cancel` fires.
    ///
    /// On completion the accumulated job (if any line matched) becomes
    /// available through [`job`](Self::job).
    #[instrument(skip(self, cancel), fields(session_id = %self.id))]
    pub async fn wait(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.require_state("wait", SessionState::Connected..=SessionState::Connected)?;
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::FatalUsage(
                "wait requires an active subscription; call subscribe first".to_string(),
            ));
        };
        let job = stream.wait(cancel).await?;

        obs::emit_session_completed(
            self.id.as_str(),
            self.started.elapsed().as_millis() as u64,
            job.is_some(),
        );
        self.job = job;
        self.state = self.state.max(SessionState::Completed);
        Ok(())
    }

    /// Stop subscriptions and close connections.
    ///
    /// Safe in any state and idempotent. The broker is only disconnected if
    /// it was connected. Every teardown step runs even if an earlier one
    /// fails; the first failure is returned.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        if let Some(spinner) = self.spinner.take() {
            spinner.stop();
        }
        if let Some(stream) = self.stream.as_mut() {
            stream.stop_all();
        }

        let mut first_error: Option<TransportError> = None;
        if self.pubsub_open {
            self.pubsub_open = false;
            if let Err(e) = self.deps.pubsub.close().await {
                obs::emit_teardown_error(self.id.as_str(), &e);
                first_error.get_or_insert(e);
            }
        }
        if self.connected {
            self.connected = false;
            if let Err(e) = self.deps.broker.disconnect().await {
                obs::emit_teardown_error(self.id.as_str(), &e);
                first_error.get_or_insert(e);
            }
        }

        if self.state == SessionState::Completed {
            self.state = SessionState::Disconnected;
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Persist the job accumulated during `wait`.
    #[instrument(skip(self), fields(session_id = %self.id))]
    pub async fn record_job(&mut self) -> Result<()> {
        if self.job.is_none() {
            return Err(ClientError::RankingUninitialized);
        }
        if self.state == SessionState::Recorded {
            return Err(ClientError::FatalUsage(
                "the job of this session was already recorded".to_string(),
            ));
        }
        let Some(profile) = self.profile.as_ref() else {
            return Err(ClientError::FatalUsage(
                "record_job requires a validated session".to_string(),
            ));
        };
        let ctx = RecordContext {
            username: profile.username.clone(),
            user_access_key: profile.access_key.clone(),
            submission: self.config.submission,
            custom_tag: self.config.custom_tag.clone(),
        };

        let recorder = JobRecorder::new(self.deps.jobs.clone(), self.deps.teams.clone());
        let job = recorder.record(self.job.clone(), &ctx).await?;

        obs::emit_session_recorded(
            self.id.as_str(),
            job.inferences.len(),
            job.team_name.as_deref(),
        );
        self.job = Some(job);
        self.state = SessionState::Recorded;
        Ok(())
    }

    /// Run `validate` through `wait`, then always tear down.
    ///
    /// A lifecycle error takes precedence over a teardown error.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        let outcome = self.run_steps(cancel).await;
        let teardown = self.disconnect().await;
        outcome?;
        teardown
    }

    async fn run_steps(&mut self, cancel: &CancellationToken) -> Result<()> {
        self.validate().await?;
        self.upload().await?;
        self.publish().await?;
        self.subscribe().await?;
        self.connect().await?;
        self.wait(cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarGzArchiver;
    use crate::fakes::{MemoryBlobStore, MemoryBroker, MemoryPubSub, StaticAuthenticator};
    use crate::output::OutputSink;
    use gradebox_state::fakes::{MemoryJobStore, MemoryTeamDirectory};

    fn profile() -> Profile {
        Profile {
            username: "alice".to_string(),
            access_key: "AK".to_string(),
            secret_key: "SK".to_string(),
            role: Some("student".to_string()),
            ..Default::default()
        }
    }

    fn deps() -> Collaborators {
        Collaborators {
            authenticator: Arc::new(StaticAuthenticator::accepting(profile())),
            archiver: Arc::new(TarGzArchiver::new()),
            blob_store: Arc::new(MemoryBlobStore::new()),
            broker: Arc::new(MemoryBroker::new()),
            pubsub: Arc::new(MemoryPubSub::new()),
            jobs: Arc::new(MemoryJobStore::new()),
            teams: Arc::new(MemoryTeamDirectory::new()),
        }
    }

    fn client_in(dir: &std::path::Path) -> SubmissionClient {
        let service = ServiceConfig::default();
        let config = ClientConfig::builder(&service)
            .directory(dir)
            .rate_limit(std::time::Duration::ZERO)
            .stdout(OutputSink::buffer())
            .stderr(OutputSink::buffer())
            .build()
            .unwrap();
        SubmissionClient::new(service, config, deps())
    }

    #[tokio::test]
    async fn upload_before_validate_is_fatal_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        let err = client.upload().await.unwrap_err();
        assert!(matches!(err, ClientError::FatalUsage(_)));
    }

    #[tokio::test]
    async fn publish_without_upload_key_is_fatal_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        let err = client.publish().await.unwrap_err();
        assert!(matches!(err, ClientError::FatalUsage(_)));
    }

    #[tokio::test]
    async fn wait_without_subscription_is_fatal_usage() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        let err = client.wait(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ClientError::FatalUsage(_)));
    }

    #[tokio::test]
    async fn disconnect_on_fresh_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert_eq!(client.state(), SessionState::Created);
    }

    #[tokio::test]
    async fn record_without_job_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        let err = client.record_job().await.unwrap_err();
        assert!(matches!(err, ClientError::RankingUninitialized));
    }

    #[tokio::test]
    async fn nothing_runs_after_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());
        client.disconnect().await.unwrap();

        let err = client.validate().await.unwrap_err();
        assert!(matches!(err, ClientError::FatalUsage(_)));
        assert!(err.to_string().contains("after disconnect"));
    }

    #[tokio::test]
    async fn subscribe_and_connect_need_a_published_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = client_in(dir.path());

        assert!(matches!(
            client.subscribe().await.unwrap_err(),
            ClientError::FatalUsage(_)
        ));
        assert!(matches!(
            client.connect().await.unwrap_err(),
            ClientError::FatalUsage(_)
        ));
        assert_eq!(client.state(), SessionState::Created);
        assert!(!client.is_connected());
    }

    #[test]
    fn states_are_ordered() {
        assert!(SessionState::Created < SessionState::Validated);
        assert!(SessionState::Connected < SessionState::Completed);
        assert!(SessionState::Disconnected < SessionState::Recorded);
    }
}
