//! Packaging a project directory for upload.
//!
//! Archives are gzip-compressed tarballs with entries in sorted order,
//! relative to the project root.

use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tar::Builder;
use walkdir::WalkDir;

use crate::error::ArchiveError;

/// Turns a directory into an uploadable byte stream.
pub trait Archiver: Send + Sync {
    fn archive(&self, dir: &Path) -> Result<Vec<u8>, ArchiveError>;

    /// File extension of produced archives, without a leading dot.
    fn extension(&self) -> &'static str;

    fn mime_type(&self) -> &'static str;
}

/// `tar.gz` archiver. Skips version-control directories.
#[derive(Debug, Clone)]
pub struct TarGzArchiver {
    excluded_dirs: Vec<String>,
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self {
            excluded_dirs: vec![".git".to_string(), ".hg".to_string(), ".svn".to_string()],
        }
    }
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_excluded_dir(mut self, name: impl Into<String>) -> Self {
        self.excluded_dirs.push(name.into());
        self
    }

    fn is_excluded(&self, name: &std::ffi::OsStr) -> bool {
        self.excluded_dirs.iter().any(|d| name == d.as_str())
    }
}

impl Archiver for TarGzArchiver {
    fn archive(&self, dir: &Path) -> Result<Vec<u8>, ArchiveError> {
        if !dir.is_dir() {
            return Err(ArchiveError::NotADirectory(dir.to_path_buf()));
        }

        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && self.is_excluded(e.file_name())));

        for entry in walker {
            let entry = entry.map_err(|source| ArchiveError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            let Ok(rel_path) = entry.path().strip_prefix(dir) else {
                continue;
            };
            if rel_path.as_os_str().is_empty() {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder.append_dir(rel_path, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), rel_path)?;
            }
        }

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }

    fn extension(&self) -> &'static str {
        "tar.gz"
    }

    fn mime_type(&self) -> &'static str {
        "application/gzip"
    }
}

/// Hex-encoded SHA-256 of an archive, recorded in upload metadata.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
