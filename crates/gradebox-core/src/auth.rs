//! Credential verification.

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::{Profile, ProfileFile};
use crate::error::AuthError;

/// Verifies the caller's credentials against a profile file.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Load the profile at `path` and check its credentials.
    ///
    /// Returns the profile together with whether it verified. An error
    /// means the profile could not be read at all.
    async fn verify(&self, path: &Path) -> Result<(Profile, bool), AuthError>;
}

/// Reads a YAML profile from disk and accepts it when the identity and
/// both keys are present.
#[derive(Debug, Clone, Default)]
pub struct ProfileAuthenticator;

impl ProfileAuthenticator {
    pub fn new() -> Self {
        Self
    }

    fn parse(path: &Path, raw: &str) -> Result<Profile, AuthError> {
        let file: ProfileFile =
            serde_yaml::from_str(raw).map_err(|e| AuthError::ProfileInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(file.profile)
    }
}

#[async_trait]
impl Authenticator for ProfileAuthenticator {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn verify(&self, path: &Path) -> Result<(Profile, bool), AuthError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AuthError::ProfileUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        let profile = Self::parse(path, &raw)?;

        let ok = !profile.username.trim().is_empty()
            && !profile.access_key.trim().is_empty()
            && !profile.secret_key.trim().is_empty();
        debug!(username = %profile.username, ok, "profile verified");
        Ok((profile, ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_profile(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join(".gradebox_profile");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn complete_profile_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(
            dir.path(),
            "profile:\n  username: alice\n  access_key: AK\n  secret_key: SK\n",
        );
        let (profile, ok) = ProfileAuthenticator::new().verify(&path).await.unwrap();
        assert!(ok);
        assert_eq!(profile.username, "alice");
    }

    #[tokio::test]
    async fn blank_secret_does_not_verify() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_profile(
            dir.path(),
            "profile:\n  username: alice\n  access_key: AK\n  secret_key: ''\n",
        );
        let (_, ok) = ProfileAuthenticator::new().verify(&path).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn missing_and_garbled_profiles_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProfileAuthenticator::new()
            .verify(&dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProfileUnreadable { .. }));

        let path = write_profile(dir.path(), "just a string");
        let err = ProfileAuthenticator::new().verify(&path).await.unwrap_err();
        assert!(matches!(err, AuthError::ProfileInvalid { .. }));
    }
}
