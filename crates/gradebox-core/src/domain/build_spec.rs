//! Declarative build specification carried by every job request.

use serde::{Deserialize, Deserializer, Serialize};

use super::profile::DockerHubCredentials;

/// What the remote executor should run, and on which resources.
///
/// Parsed once from YAML. The only mutation after loading is the Docker
/// push credential backfill from the authenticated profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSpecification {
    #[serde(default)]
    pub runtime: RuntimeSpec,
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub commands: Commands,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu: CpuResources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuResources>,
    #[serde(default)]
    pub network: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuResources {
    #[serde(default)]
    pub architecture: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpuResources {
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_image: Option<BuildImage>,
    #[serde(default)]
    pub build: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildImage {
    pub image_name: String,
    #[serde(default = "default_dockerfile")]
    pub dockerfile: String,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushSpec {
    #[serde(default)]
    pub push: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,
    #[serde(default)]
    pub credentials: PushCredentials,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for PushCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_dockerfile() -> String {
    "Dockerfile".to_string()
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        Float(f64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::Float(f) => f.to_string(),
    }))
}

impl BuildSpecification {
    /// Parse a YAML document.
    pub fn from_yaml(buf: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(buf)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Queue name implied by the target CPU architecture, if one is declared.
    pub fn derived_queue_name(&self, app_name: &str) -> Option<String> {
        let arch = self.resources.cpu.architecture.trim();
        if arch.is_empty() {
            None
        } else {
            Some(format!("{}_{}", app_name, arch))
        }
    }

    /// Fill empty push credentials from the user's Docker Hub account.
    ///
    /// Only applies when pushing is enabled and neither field was set.
    /// Returns whether anything was filled.
    pub fn backfill_push_credentials(&mut self, docker: Option<&DockerHubCredentials>) -> bool {
        let Some(docker) = docker else {
            return false;
        };
        let Some(push) = self
            .commands
            .build_image
            .as_mut()
            .and_then(|image| image.push.as_mut())
        else {
            return false;
        };
        if !push.push {
            return false;
        }
        if push.credentials.username.is_empty() && push.credentials.password.is_empty() {
            push.credentials.username = docker.username.clone();
            push.credentials.password = docker.password.clone();
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUSHING_SPEC: &str = r#"
runtime:
  version: 0.2
  image: gradebox/runner:latest
resources:
  cpu:
    architecture: amd64
  network: false
commands:
  build_image:
    image_name: alice/project:v1
    push:
      push: true
  build:
    - make
"#;

    fn docker() -> DockerHubCredentials {
        DockerHubCredentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }
    }

    #[test]
    fn parses_numeric_version_as_string() {
        let spec = BuildSpecification::from_yaml(PUSHING_SPEC).unwrap();
        assert_eq!(spec.runtime.version.as_deref(), Some("0.2"));
        assert_eq!(spec.commands.build, vec!["make".to_string()]);
        assert_eq!(
            spec.commands.build_image.as_ref().unwrap().dockerfile,
            "Dockerfile"
        );
    }

    #[test]
    fn derives_queue_from_architecture() {
        let spec = BuildSpecification::from_yaml(PUSHING_SPEC).unwrap();
        assert_eq!(
            spec.derived_queue_name("gradebox").as_deref(),
            Some("gradebox_amd64")
        );
        assert_eq!(BuildSpecification::default().derived_queue_name("gradebox"), None);
    }

    #[test]
    fn backfills_only_empty_credentials() {
        let mut spec = BuildSpecification::from_yaml(PUSHING_SPEC).unwrap();
        assert!(spec.backfill_push_credentials(Some(&docker())));
        let creds = &spec.commands.build_image.as_ref().unwrap().push.as_ref().unwrap().credentials;
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "hunter2");

        // already filled: untouched
        assert!(!spec.backfill_push_credentials(Some(&DockerHubCredentials {
            username: "bob".to_string(),
            password: "x".to_string(),
        })));
    }

    #[test]
    fn backfill_skips_when_not_pushing() {
        let mut spec = BuildSpecification::from_yaml(PUSHING_SPEC).unwrap();
        if let Some(push) = spec
            .commands
            .build_image
            .as_mut()
            .and_then(|i| i.push.as_mut())
        {
            push.push = false;
        }
        assert!(!spec.backfill_push_credentials(Some(&docker())));
        assert!(!spec.backfill_push_credentials(None));
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = PushCredentials {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
