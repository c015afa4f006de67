//! Artifact writer
//!
//! Places rendered artifacts at `<destination>/<path>/<filename>`.

use contrail_core::{ArtifactRecord, ArtifactStatus};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Errors while persisting an artifact; fatal for the run
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Artifact path '{path}' escapes the destination directory")]
    Escape { path: String },

    #[error("Failed to write {}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

/// Writes artifacts below one destination root
#[derive(Debug, Clone)]
pub struct Writer {
    destination: PathBuf,
    dry_run: bool,
}

impl Writer {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            dry_run: false,
        }
    }

    /// Compute records without touching the filesystem
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Normalized path relative to the destination
    pub fn relative_path(dir: &str, filename: &str) -> Result<PathBuf, WriteError> {
        let joined = Path::new(dir).join(filename);
        let escape = || WriteError::Escape {
            path: joined.display().to_string(),
        };

        let mut normalized = PathBuf::new();
        for component in joined.components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        if normalized.as_os_str().is_empty() || filename.trim().is_empty() {
            return Err(escape());
        }
        Ok(normalized)
    }

    /// Write one artifact; identical existing content is left alone
    pub fn write(&self, label: &str, dir: &str, filename: &str, content: &str) -> Result<ArtifactRecord, WriteError> {
        let relative = Self::relative_path(dir, filename)?;
        let full = self.destination.join(&relative);
        let sha256 = hex::encode(Sha256::digest(content.as_bytes()));

        let status = if self.dry_run {
            ArtifactStatus::Planned
        } else if std::fs::read(&full).map(|existing| existing == content.as_bytes()).unwrap_or(false) {
            ArtifactStatus::Unchanged
        } else {
            let io = |e: std::io::Error| WriteError::Io {
                path: full.clone(),
                message: e.to_string(),
            };
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).map_err(io)?;
            }
            std::fs::write(&full, content).map_err(io)?;
            ArtifactStatus::Written
        };

        tracing::debug!(path = %full.display(), ?status, "artifact");
        Ok(ArtifactRecord {
            label: label.to_string(),
            path: relative.to_string_lossy().replace('\\', "/"),
            sha256,
            status,
        })
    }
}
