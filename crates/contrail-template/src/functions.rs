//! Template functions
//!
//! `file("relative/path")` inlines a snippet verbatim from the base directory.

use minijinja::{Error, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Resolve a snippet path under `base`, refusing anything that could leave it
pub fn resolve_snippet(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty() {
        return None;
    }
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(base.join(relative))
}

/// Backing state of the `file()` function for one render.
///
/// The first path that failed is remembered so the renderer can report it
/// as a file failure regardless of how the engine wraps the error.
#[derive(Debug, Clone)]
pub struct FileResolver {
    base: Option<PathBuf>,
    failed: Arc<Mutex<Option<String>>>,
}

impl FileResolver {
    pub fn new(base: Option<PathBuf>) -> Self {
        Self {
            base,
            failed: Arc::new(Mutex::new(None)),
        }
    }

    /// file() function - reads a snippet relative to the base directory
    ///
    /// Usage in Jinja: {{ file('snippets/' ~ device.slug ~ '.md') }}
    pub fn read(&self, path: &str) -> Result<String, Error> {
        let content = self
            .base
            .as_deref()
            .and_then(|base| resolve_snippet(base, path))
            .and_then(|full| std::fs::read_to_string(full).ok());

        match content {
            Some(content) => {
                tracing::debug!(path, bytes = content.len(), "inlined snippet");
                Ok(content)
            }
            None => {
                if let Ok(mut failed) = self.failed.lock() {
                    failed.get_or_insert_with(|| path.to_string());
                }
                Err(Error::new(ErrorKind::TemplateNotFound, format!("file '{}' not found", path)))
            }
        }
    }

    /// Path of the first failed read, if any
    pub fn failure(&self) -> Option<String> {
        self.failed.lock().ok().and_then(|failed| failed.clone())
    }
}
