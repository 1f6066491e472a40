//! Authenticated user profile.

use serde::{Deserialize, Serialize};

/// On-disk layout of a profile file: a single top-level `profile` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileFile {
    pub profile: Profile,
}

/// Identity and credentials of the submitting user.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    /// Course role, e.g. `ece_student`. Graded submissions require the
    /// configured role marker to appear in it.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub dockerhub: Option<DockerHubCredentials>,
}

impl std::fmt::Debug for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profile")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("team", &self.team)
            .finish_non_exhaustive()
    }
}

impl Profile {
    pub fn user(&self) -> User {
        User {
            username: self.username.clone(),
            firstname: self.firstname.clone(),
            lastname: self.lastname.clone(),
            email: self.email.clone(),
        }
    }

    pub fn has_role(&self, marker: &str) -> bool {
        self.role
            .as_deref()
            .map(|role| role.to_lowercase().contains(&marker.to_lowercase()))
            .unwrap_or(false)
    }
}

/// User identity embedded in a job request. Carries no secrets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockerHubCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DockerHubCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerHubCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
