//! Gradebox - submission client for the hosted build-and-grade service
//!
//! The `gradebox` command packages a project directory, runs it remotely and
//! streams the output back.
//!
//! ## Commands
//!
//! - `submit`: Run the full lifecycle and record the scored job
//! - `validate`: Authenticate and print the build specification that would be used

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use gradebox_core::{
    session_span, ClientConfig, Collaborators, LogRouting, OutputSink, ProfileAuthenticator,
    ServiceConfig, SubmissionClient, SubmissionKind, TarGzArchiver,
};
use gradebox_gateway::Gateway;
use gradebox_state::SurrealJobStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument, Level};

#[derive(Parser)]
#[command(name = "gradebox")]
#[command(author = "Gradebox Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Submit projects to the Gradebox build-and-grade service", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Disable colored console output
    #[arg(long, global = true)]
    no_color: bool,

    /// Service configuration file (TOML)
    #[arg(long, global = true, env = "GRADEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the project, run it remotely and stream its output
    Submit {
        #[command(flatten)]
        session: SessionArgs,

        /// Give up waiting for the job after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Do not record ad hoc runs (graded submissions are always recorded)
        #[arg(long)]
        no_record: bool,
    },

    /// Check credentials and print the resolved build specification
    Validate {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args, Debug, Default)]
struct SessionArgs {
    /// Project directory to upload (default: current directory)
    #[arg(long)]
    path: Option<PathBuf>,

    /// Build file to use instead of `<path>/<spec-name>.yml`
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Base name of the build file inside the project directory
    #[arg(long)]
    spec_name: Option<String>,

    /// Profile with the user's credentials (default: ~/.gradebox_profile)
    #[arg(long)]
    profile: Option<PathBuf>,

    /// Queue to publish to, overriding the one derived from the build file
    #[arg(long)]
    queue: Option<String>,

    /// Minimum seconds between outbound requests
    #[arg(long)]
    ratelimit: Option<f64>,

    /// Make a graded submission (m1, m2, m3, m4, final, custom)
    #[arg(long)]
    submit: Option<String>,

    /// Submission tag for custom submissions
    #[arg(long)]
    tag: Option<String>,

    /// Architecture of the executor fleet; selects the broker
    #[arg(long)]
    server_arch: Option<String>,

    /// Echo stdout-kind output on stdout instead of stderr
    #[arg(long)]
    split_streams: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    gradebox_core::init_tracing(cli.json, level);

    let service =
        ServiceConfig::load(cli.config.as_deref()).context("Failed to load service configuration")?;
    if cli.no_color || !service.color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Submit {
            session,
            timeout,
            no_record,
        } => {
            let config = client_config(&service, &session, cli.verbose)?;
            cmd_submit(service, config, timeout.map(Duration::from_secs), no_record).await
        }
        Commands::Validate { session } => {
            let config = client_config(&service, &session, cli.verbose)?;
            cmd_validate(service, config).await
        }
    }
}

/// Translate command-line flags into session options.
fn client_config(service: &ServiceConfig, args: &SessionArgs, verbose: bool) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder(service)
        .stdout(OutputSink::Stdout)
        .stderr(OutputSink::Stderr);

    if let Some(path) = &args.path {
        builder = builder.directory(path);
    }
    if let Some(spec) = &args.spec {
        builder = builder.build_file_path(spec);
    }
    if let Some(name) = &args.spec_name {
        builder = builder.build_file_base_name(name);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile_path(profile);
    }
    if let Some(queue) = &args.queue {
        builder = builder.job_queue_name(queue);
    }
    if let Some(secs) = args.ratelimit {
        let interval = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("Invalid --ratelimit value: {}", secs))?;
        builder = builder.rate_limit(interval);
    }
    if let Some(kind) = &args.submit {
        builder = builder.submission(kind.parse::<SubmissionKind>()?);
    }
    if let Some(tag) = &args.tag {
        builder = builder.custom_tag(tag);
    }
    if let Some(arch) = &args.server_arch {
        builder = builder.server_arch(arch);
    }
    if args.split_streams {
        builder = builder.routing(LogRouting::Split);
    }
    if verbose {
        builder = builder.verbose(true);
    }

    builder.build().context("Invalid submission options")
}

/// Local job database when no SurrealDB endpoint is configured.
fn local_db_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".gradebox").join("db"),
        None => Path::new(".gradebox").join("db"),
    }
}

async fn collaborators(config: &ClientConfig) -> Result<Collaborators> {
    let gateway = Gateway::from_env().context("Failed to configure the job gateway")?;
    let store = Arc::new(
        SurrealJobStore::from_env(&local_db_dir())
            .await
            .context("Failed to connect to the job database")?,
    );

    Ok(Collaborators {
        authenticator: Arc::new(ProfileAuthenticator::new()),
        archiver: Arc::new(TarGzArchiver::new().with_excluded_dir(".gradebox")),
        blob_store: Arc::new(gateway.blob_store()),
        broker: Arc::new(gateway.broker(config.server_arch.as_deref())),
        pubsub: Arc::new(gateway.pubsub()),
        jobs: store.clone(),
        teams: store,
    })
}

/// Graded submissions always record; ad hoc runs only when something was parsed.
fn should_record(is_submission: bool, no_record: bool, parsed: bool) -> bool {
    is_submission || (!no_record && parsed)
}

/// Cancel `token` on Ctrl-C or once `timeout` elapses.
fn cancel_on_interrupt(token: &CancellationToken, timeout: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; stopping the session");
            on_signal.cancel();
        }
    });
    if let Some(timeout) = timeout {
        let on_timeout = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(timeout_secs = timeout.as_secs(), "timed out waiting for the job");
            on_timeout.cancel();
        });
    }
}

/// Run the full lifecycle and record the result
async fn cmd_submit(
    service: ServiceConfig,
    config: ClientConfig,
    timeout: Option<Duration>,
    no_record: bool,
) -> Result<()> {
    let deps = collaborators(&config).await?;
    let stdout = config.stdout.clone();
    let mut client = SubmissionClient::new(service, config, deps);
    let span = session_span(client.id().as_str());

    let cancel = CancellationToken::new();
    cancel_on_interrupt(&cancel, timeout);

    if let Err(e) = client.run(&cancel).instrument(span.clone()).await {
        if e.is_cancelled() {
            bail!("Stopped before the job finished; nothing was recorded");
        }
        return Err(e).context("Submission failed");
    }

    let is_submission = client.config().is_submission();
    if !should_record(is_submission, no_record, client.job().is_some()) {
        debug!("nothing to record");
        return Ok(());
    }
    client
        .record_job()
        .instrument(span)
        .await
        .context("Failed to record the job")?;

    if let Some(job) = client.job() {
        match (&job.submission_tag, &job.team_name) {
            (Some(tag), Some(team)) => {
                stdout.success(&format!("Your {} submission was recorded for team {}.", tag, team))
            }
            _ => stdout.success(&format!("Job {} recorded.", job.id)),
        }
    }
    Ok(())
}

/// Authenticate and print the resolved build specification
async fn cmd_validate(service: ServiceConfig, config: ClientConfig) -> Result<()> {
    let deps = collaborators(&config).await?;
    let mut client = SubmissionClient::new(service, config, deps);
    let span = session_span(client.id().as_str());

    client
        .validate()
        .instrument(span.clone())
        .await
        .context("Validation failed")?;

    if let Some(spec) = client.build_spec() {
        println!("{}", spec.to_yaml().context("Failed to render build file")?);
    }
    println!("queue: {}", client.job_queue_name());

    client.disconnect().instrument(span).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_submit_flags() {
        let cli = Cli::try_parse_from([
            "gradebox",
            "--no-color",
            "submit",
            "--path",
            "/tmp/project",
            "--submit",
            "M2",
            "--timeout",
            "600",
            "--split-streams",
        ])
        .unwrap();

        assert!(cli.no_color);
        match cli.command {
            Commands::Submit {
                session,
                timeout,
                no_record,
            } => {
                assert_eq!(session.path, Some(PathBuf::from("/tmp/project")));
                assert_eq!(session.submit.as_deref(), Some("M2"));
                assert_eq!(timeout, Some(600));
                assert!(session.split_streams);
                assert!(!no_record);
            }
            Commands::Validate { .. } => panic!("expected submit"),
        }
    }

    #[test]
    fn maps_flags_onto_client_config() {
        let dir = tempfile::tempdir().unwrap();
        let args = SessionArgs {
            path: Some(dir.path().to_path_buf()),
            queue: Some("gradebox_debug".to_string()),
            ratelimit: Some(0.5),
            submit: Some("custom".to_string()),
            tag: Some("bonus".to_string()),
            server_arch: Some("s390x".to_string()),
            split_streams: true,
            ..Default::default()
        };

        let config = client_config(&ServiceConfig::default(), &args, true).unwrap();
        assert_eq!(config.directory, dir.path());
        assert_eq!(config.job_queue_name.as_deref(), Some("gradebox_debug"));
        assert_eq!(config.rate_limit, Duration::from_millis(500));
        assert_eq!(config.submission, Some(SubmissionKind::Custom));
        assert_eq!(config.submission_tag().as_deref(), Some("bonus"));
        assert_eq!(config.server_arch.as_deref(), Some("s390x"));
        assert_eq!(config.routing, LogRouting::Split);
        assert!(config.verbose);
    }

    #[test]
    fn rejects_unknown_submission_and_bad_ratelimit() {
        let args = SessionArgs {
            submit: Some("m9".to_string()),
            ..Default::default()
        };
        let err = client_config(&ServiceConfig::default(), &args, false).unwrap_err();
        assert!(err.to_string().contains("invalid submission name"));

        let args = SessionArgs {
            ratelimit: Some(-1.0),
            ..Default::default()
        };
        assert!(client_config(&ServiceConfig::default(), &args, false).is_err());
    }

    #[test]
    fn tag_without_custom_submission_is_rejected() {
        let args = SessionArgs {
            tag: Some("bonus".to_string()),
            ..Default::default()
        };
        assert!(client_config(&ServiceConfig::default(), &args, false).is_err());
    }

    #[test]
    fn recording_policy() {
        assert!(should_record(true, true, false));
        assert!(should_record(false, false, true));
        assert!(!should_record(false, true, true));
        assert!(!should_record(false, false, false));
    }
}
