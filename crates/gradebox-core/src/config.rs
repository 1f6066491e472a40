//! Service-level and per-session configuration.
//!
//! [`ServiceConfig`] holds process-wide settings (app name, buckets, queue
//! defaults, retention). It is loaded from an optional TOML file and then
//! overridden by `GRADEBOX_*` environment variables.
//!
//! [`ClientConfig`] holds the options of one submission session and is
//! built through [`ClientConfigBuilder`], which rejects invalid combinations.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::output::{LogRouting, OutputSink};
use crate::pacing::MAX_INTERVAL;

/// Version stamped on job requests and recorded jobs.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Process-wide settings shared by every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub app_name: String,
    /// Queue used when neither an explicit override nor the build
    /// specification names one. Defaults to `<app_name>_default`.
    pub job_queue_name: Option<String>,
    pub upload_bucket: String,
    pub upload_destination_directory: String,
    /// Defaults to `<app_name>_build`.
    pub build_file_base_name: Option<String>,
    /// Files that must exist in the project directory for graded submissions.
    pub submit_requirements: Vec<String>,
    /// Retention of graded submission uploads, in seconds.
    pub submission_retention_secs: u64,
    /// Retention of ad hoc uploads, in seconds.
    pub adhoc_retention_secs: u64,
    /// Substring a profile role must contain to make graded submissions.
    pub course_role_marker: String,
    /// Minimum interval between outbound transport calls, in milliseconds.
    pub rate_limit_ms: u64,
    pub color: bool,
    pub verbose: bool,
    pub debug: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "gradebox".to_string(),
            job_queue_name: None,
            upload_bucket: "files.gradebox.dev".to_string(),
            upload_destination_directory: "userdata".to_string(),
            build_file_base_name: None,
            submit_requirements: vec!["report.pdf".to_string()],
            submission_retention_secs: 180 * SECONDS_PER_DAY,
            adhoc_retention_secs: SECONDS_PER_DAY,
            course_role_marker: "student".to_string(),
            rate_limit_ms: 1000,
            color: true,
            verbose: false,
            debug: false,
        }
    }
}

impl ServiceConfig {
    /// Load from `path` (if given) and apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ClientError::io(format!("unable to read {}", path.display()), e))?;
        Self::from_toml_str(&raw)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `GRADEBOX_*` overrides using `lookup` to read variables.
    ///
    /// Unparseable numeric or boolean values are ignored.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GRADEBOX_APP_NAME") {
            self.app_name = v;
        }
        if let Some(v) = lookup("GRADEBOX_JOB_QUEUE") {
            self.job_queue_name = Some(v);
        }
        if let Some(v) = lookup("GRADEBOX_UPLOAD_BUCKET") {
            self.upload_bucket = v;
        }
        if let Some(v) = lookup("GRADEBOX_UPLOAD_DIR") {
            self.upload_destination_directory = v;
        }
        if let Some(v) = lookup("GRADEBOX_BUILD_FILE") {
            self.build_file_base_name = Some(v);
        }
        if let Some(v) = lookup("GRADEBOX_SUBMIT_REQUIREMENTS") {
            self.submit_requirements = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = lookup("GRADEBOX_ROLE_MARKER") {
            self.course_role_marker = v;
        }
        if let Some(v) = lookup("GRADEBOX_RATE_LIMIT_MS").and_then(|v| v.parse().ok()) {
            self.rate_limit_ms = v;
        }
        if let Some(v) = lookup("GRADEBOX_COLOR").and_then(|v| parse_bool(&v)) {
            self.color = v;
        }
        if let Some(v) = lookup("GRADEBOX_VERBOSE").and_then(|v| parse_bool(&v)) {
            self.verbose = v;
        }
        if let Some(v) = lookup("GRADEBOX_DEBUG").and_then(|v| parse_bool(&v)) {
            self.debug = v;
        }
    }

    pub fn default_job_queue_name(&self) -> String {
        match self.job_queue_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}_default", self.app_name),
        }
    }

    pub fn build_file_base_name(&self) -> String {
        match self.build_file_base_name.as_deref() {
            Some(name) if !name.is_empty() && name != "default" => name.to_string(),
            _ => format!("{}_build", self.app_name),
        }
    }

    pub fn submission_retention(&self) -> Duration {
        Duration::from_secs(self.submission_retention_secs)
    }

    pub fn adhoc_retention(&self) -> Duration {
        Duration::from_secs(self.adhoc_retention_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retention_for(&self, is_submission: bool) -> Duration {
        if is_submission {
            self.submission_retention()
        } else {
            self.adhoc_retention()
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Resolve the queue a job is published to.
///
/// An explicit override wins, then the name derived from the build
/// specification, then the configured default. Empty strings count as unset.
pub fn resolve_job_queue(explicit: Option<&str>, derived: Option<&str>, default: &str) -> String {
    explicit
        .filter(|s| !s.is_empty())
        .or(derived.filter(|s| !s.is_empty()))
        .unwrap_or(default)
        .to_string()
}

// ---------------------------------------------------------------------------
// Submission kinds
// ---------------------------------------------------------------------------

/// Graded submission kinds. Each selects an embedded build specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    M1,
    M2,
    M3,
    M4,
    Final,
    Custom,
}

impl SubmissionKind {
    pub const ALL: [SubmissionKind; 6] = [
        Self::M1,
        Self::M2,
        Self::M3,
        Self::M4,
        Self::Final,
        Self::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "m1",
            Self::M2 => "m2",
            Self::M3 => "m3",
            Self::M4 => "m4",
            Self::Final => "final",
            Self::Custom => "custom",
        }
    }

    /// Tag recorded on the job. Custom submissions use the caller's tag,
    /// falling back to `eval`.
    pub fn tag(&self, custom_tag: Option<&str>) -> String {
        match self {
            Self::Custom => custom_tag
                .filter(|t| !t.is_empty())
                .unwrap_or("eval")
                .to_string(),
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "m1" => Ok(Self::M1),
            "m2" => Ok(Self::M2),
            "m3" => Ok(Self::M3),
            "m4" => Ok(Self::M4),
            "final" => Ok(Self::Final),
            "custom" | "eval" => Ok(Self::Custom),
            _ => Err(ClientError::validation(format!(
                "invalid submission name. Valid submission names are {}",
                Self::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-session options
// ---------------------------------------------------------------------------

/// Options of a single submission session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Directory that is packaged and uploaded.
    pub directory: PathBuf,
    pub build_file_base_name: String,
    /// Explicit build file; wins over `directory/<base name>.yml`.
    pub build_file_path: Option<PathBuf>,
    pub profile_path: PathBuf,
    /// Minimum interval between outbound transport calls. Zero disables pacing.
    pub rate_limit: Duration,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub job_queue_name: Option<String>,
    pub submission: Option<SubmissionKind>,
    pub custom_tag: Option<String>,
    /// Target architecture of the executor fleet; selects the broker.
    pub server_arch: Option<String>,
    pub routing: LogRouting,
    /// Prefix echoed log lines with their timestamps.
    pub verbose: bool,
}

impl ClientConfig {
    pub fn builder(service: &ServiceConfig) -> ClientConfigBuilder {
        ClientConfigBuilder::new(service)
    }

    pub fn is_submission(&self) -> bool {
        self.submission.is_some()
    }

    pub fn submission_tag(&self) -> Option<String> {
        self.submission
            .map(|kind| kind.tag(self.custom_tag.as_deref()))
    }
}

/// Default profile location: `$HOME/.gradebox_profile`.
pub fn default_profile_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".gradebox_profile"),
        None => PathBuf::from(".gradebox_profile"),
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    default_base_name: String,
    directory: Option<PathBuf>,
    build_file_base_name: Option<String>,
    build_file_path: Option<PathBuf>,
    profile_path: Option<PathBuf>,
    rate_limit: Duration,
    stdout: OutputSink,
    stderr: OutputSink,
    job_queue_name: Option<String>,
    submission: Option<SubmissionKind>,
    custom_tag: Option<String>,
    server_arch: Option<String>,
    routing: LogRouting,
    verbose: bool,
}

impl ClientConfigBuilder {
    pub fn new(service: &ServiceConfig) -> Self {
        Self {
            default_base_name: service.build_file_base_name(),
            directory: None,
            build_file_base_name: None,
            build_file_path: None,
            profile_path: None,
            rate_limit: if service.debug {
                Duration::ZERO
            } else {
                service.rate_limit()
            },
            stdout: OutputSink::Stdout,
            stderr: OutputSink::Stderr,
            job_queue_name: None,
            submission: None,
            custom_tag: None,
            server_arch: None,
            routing: LogRouting::default(),
            verbose: service.verbose,
        }
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn build_file_base_name(mut self, name: impl Into<String>) -> Self {
        self.build_file_base_name = Some(name.into());
        self
    }

    pub fn build_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_file_path = Some(path.into());
        self
    }

    pub fn profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    pub fn rate_limit(mut self, interval: Duration) -> Self {
        self.rate_limit = interval;
        self
    }

    pub fn stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    pub fn job_queue_name(mut self, name: impl Into<String>) -> Self {
        self.job_queue_name = Some(name.into());
        self
    }

    pub fn submission(mut self, kind: SubmissionKind) -> Self {
        self.submission = Some(kind);
        self
    }

    pub fn custom_tag(mut self, tag: impl Into<String>) -> Self {
        self.custom_tag = Some(tag.into());
        self
    }

    pub fn server_arch(mut self, arch: impl Into<String>) -> Self {
        self.server_arch = Some(arch.into());
        self
    }

    pub fn routing(mut self, routing: LogRouting) -> Self {
        self.routing = routing;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> Result<ClientConfig> {
        if self.custom_tag.is_some() && self.submission != Some(SubmissionKind::Custom) {
            return Err(ClientError::Config(
                "a custom tag requires the custom submission kind".to_string(),
            ));
        }
        if matches!(self.job_queue_name.as_deref(), Some(name) if name.trim().is_empty()) {
            return Err(ClientError::Config(
                "job queue override must not be empty".to_string(),
            ));
        }
        let base_name_overridden = self
            .build_file_base_name
            .as_deref()
            .is_some_and(|name| name != self.default_base_name);
        if self.build_file_path.is_some() && base_name_overridden {
            return Err(ClientError::Config(
                "specify either a build file path or a build file base name, not both".to_string(),
            ));
        }
        if self.rate_limit > MAX_INTERVAL {
            return Err(ClientError::Config(format!(
                "rate limit must not exceed {}s",
                MAX_INTERVAL.as_secs()
            )));
        }
        if matches!(self.build_file_base_name.as_deref(), Some("")) {
            return Err(ClientError::Config(
                "build file base name must not be empty".to_string(),
            ));
        }

        let directory = match self.directory {
            Some(dir) => dir,
            None => std::env::current_dir()
                .map_err(|e| ClientError::io("cannot find current working directory", e))?,
        };

        Ok(ClientConfig {
            directory,
            build_file_base_name: self
                .build_file_base_name
                .unwrap_or(self.default_base_name),
            build_file_path: self.build_file_path,
            profile_path: self.profile_path.unwrap_or_else(default_profile_path),
            rate_limit: self.rate_limit,
            stdout: self.stdout,
            stderr: self.stderr,
            job_queue_name: self.job_queue_name,
            submission: self.submission,
            custom_tag: self.custom_tag,
            server_arch: self.server_arch.filter(|arch| !arch.is_empty()),
            routing: self.routing,
            verbose: self.verbose,
        })
    }
}
