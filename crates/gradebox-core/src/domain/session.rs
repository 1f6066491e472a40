use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one submission run.
///
/// Assigned once when the client is constructed and used verbatim as the
/// correlation key for the queue message, the log channel, the upload key
/// and the persisted job record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pub/sub channel the remote executor streams this session's log to.
    pub fn log_channel(&self, app_name: &str) -> String {
        format!("{}/log-{}", app_name, self.0)
    }

    /// Object key of the uploaded project archive.
    pub fn upload_key(&self, destination_dir: &str, extension: &str) -> String {
        format!("{}/{}.{}", destination_dir, self.0, extension)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn derived_names_embed_id_verbatim() {
        let id = SessionId::from("5f0c");
        assert_eq!(id.log_channel("gradebox"), "gradebox/log-5f0c");
        assert_eq!(id.upload_key("userdata", "tar.gz"), "userdata/5f0c.tar.gz");
    }
}
