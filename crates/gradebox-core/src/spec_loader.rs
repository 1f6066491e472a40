//! Locating and parsing build specifications.
//!
//! Graded submissions use a canonical specification compiled into the
//! binary; everything else reads `<directory>/<base name>.yml` or an
//! explicit path.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::{ClientConfig, SubmissionKind};
use crate::domain::BuildSpecification;
use crate::error::{ClientError, Result};

const M1_SPEC: &str = include_str!("../fixtures/m1.yml");
const M2_SPEC: &str = include_str!("../fixtures/m2.yml");
const M3_SPEC: &str = include_str!("../fixtures/m3.yml");
const M4_SPEC: &str = include_str!("../fixtures/m4.yml");
const FINAL_SPEC: &str = include_str!("../fixtures/final.yml");
const EVAL_SPEC: &str = include_str!("../fixtures/eval.yml");

/// Where a loaded specification came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Embedded(SubmissionKind),
    File(PathBuf),
}

impl std::fmt::Display for SpecSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(kind) => write!(f, "embedded {} specification", kind),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub spec: BuildSpecification,
    pub source: SpecSource,
    /// The YAML text as read, for echoing to the user.
    pub raw: String,
}

/// Canonical specification text for a graded submission kind.
pub fn embedded_spec(kind: SubmissionKind) -> &'static str {
    match kind {
        SubmissionKind::M1 => M1_SPEC,
        SubmissionKind::M2 => M2_SPEC,
        SubmissionKind::M3 => M3_SPEC,
        SubmissionKind::M4 => M4_SPEC,
        SubmissionKind::Final => FINAL_SPEC,
        SubmissionKind::Custom => EVAL_SPEC,
    }
}

/// Resolve the build file: explicit path, else `<directory>/<base>.yml`.
/// The result is absolute.
pub fn find_spec_file(config: &ClientConfig) -> Result<PathBuf> {
    let path = match &config.build_file_path {
        Some(path) => path.clone(),
        None => config
            .directory
            .join(format!("{}.yml", config.build_file_base_name)),
    };
    if !path.is_file() {
        return Err(ClientError::validation(format!(
            "the build file [{}] does not exist",
            path.display()
        )));
    }
    Ok(std::path::absolute(&path).unwrap_or(path))
}

/// Load the specification that applies to `config`.
pub fn load(config: &ClientConfig) -> Result<LoadedSpec> {
    let (raw, source) = match config.submission {
        Some(kind) => (embedded_spec(kind).to_string(), SpecSource::Embedded(kind)),
        None => {
            let path = find_spec_file(config)?;
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| ClientError::io(format!("unable to read {}", path.display()), e))?;
            (raw, SpecSource::File(path))
        }
    };

    let spec = BuildSpecification::from_yaml(&raw).map_err(|e| {
        ClientError::validation(format!("unable to parse build file {}: {}", source, e))
    })?;
    debug!(source = %source, "build specification loaded");

    Ok(LoadedSpec { spec, source, raw })
}

/// Ensure every required file exists under `directory`.
pub fn check_submit_requirements(directory: &Path, requirements: &[String]) -> Result<()> {
    for name in requirements {
        let path = directory.join(name);
        if !path.is_file() {
            return Err(ClientError::validation(format!(
                "Didn't find a file required for submission: [{}]",
                path.display()
            )));
        }
    }
    Ok(())
}
