//! Source tree walking
//!
//! Directory nesting becomes parent/child structure: a directory's anchor is
//! its `contract.{json,yaml,yml}` document, and every other document in that
//! directory or below (until a deeper anchor) is attached to it.

use contrail_core::Contract;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::document::{self, DocumentFormat};
use crate::error::LoadError;

/// File stem that marks a directory's owning contract
pub const ANCHOR_STEM: &str = "contract";

/// One root directory of contract documents
#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Every document file, sorted by path; hidden entries are skipped
    pub fn documents(&self) -> Result<Vec<PathBuf>, LoadError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = entry.map_err(|e| LoadError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
                message: e.to_string(),
            })?;
            if entry.file_type().is_file() && DocumentFormat::from_path(entry.path()).is_some() {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Parse every document and assemble the top-level contracts of this tree
    pub fn load(&self) -> Result<Vec<Contract>, LoadError> {
        let files = self.documents()?;

        let mut anchors: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
        for file in files.iter().filter(|f| is_anchor(f)) {
            let dir = parent_dir(file);
            if let Some(previous) = anchors.insert(dir, file.clone()) {
                return Err(LoadError::invalid(
                    file,
                    format!("directory already anchored by {}", previous.display()),
                ));
            }
        }

        let mut parsed: BTreeMap<PathBuf, Vec<Contract>> = BTreeMap::new();
        for file in &files {
            let contracts = document::read_document(file)?;
            if is_anchor(file) && contracts.len() != 1 {
                return Err(LoadError::invalid(file, "anchor document must declare exactly one contract"));
            }
            parsed.insert(file.clone(), contracts);
        }

        // Deepest first, and within a directory non-anchors before the anchor,
        // so an anchor has all its children before it moves to its own owner.
        let mut order: Vec<&PathBuf> = files.iter().collect();
        order.sort_by(|a, b| {
            (Reverse(a.components().count()), is_anchor(a), *a)
                .cmp(&(Reverse(b.components().count()), is_anchor(b), *b))
        });

        for file in order {
            let Some(owner) = self.owner_of(file, &anchors) else {
                continue;
            };
            let contracts = parsed.remove(file).unwrap_or_default();
            let anchor = parsed
                .get_mut(&owner)
                .and_then(|c| c.first_mut())
                .ok_or_else(|| LoadError::invalid(file, format!("owner {} was not loaded", owner.display())))?;
            for contract in contracts {
                anchor.add_child(contract)?;
            }
        }

        Ok(parsed.into_values().flatten().collect())
    }

    /// Nearest anchor above a document, never outside the root
    fn owner_of(&self, file: &Path, anchors: &BTreeMap<PathBuf, PathBuf>) -> Option<PathBuf> {
        let dir = file.parent()?;
        let mut current = if is_anchor(file) { dir.parent() } else { Some(dir) };

        while let Some(candidate) = current {
            if !candidate.starts_with(&self.root) {
                return None;
            }
            if let Some(anchor) = anchors.get(candidate) {
                return Some(anchor.clone());
            }
            current = candidate.parent();
        }
        None
    }
}

fn is_anchor(path: &Path) -> bool {
    path.file_stem().and_then(|s| s.to_str()) == Some(ANCHOR_STEM)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}
