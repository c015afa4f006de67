//! Contrail Loader
//!
//! Reads contract documents from disk and assembles the universe: the
//! primary tree is required, the private overlay is merged on top when it
//! exists. Loading is all-or-nothing; a conflicting overlay never leaves a
//! partially merged universe behind.

pub mod document;
pub mod error;
pub mod source;

pub use document::{contract_from_value, parse_document, read_document, DocumentFormat};
pub use error::LoadError;
pub use source::{SourceTree, ANCHOR_STEM};

use contrail_core::{Contract, Universe};
use std::path::Path;

/// Load the required primary tree
pub fn load_primary(root: &Path) -> Result<Vec<Contract>, LoadError> {
    let tree = SourceTree::new(root);
    if !tree.exists() {
        return Err(LoadError::MissingSource { path: root.to_path_buf() });
    }
    let contracts = tree.load()?;
    if contracts.is_empty() {
        return Err(LoadError::MissingSource { path: root.to_path_buf() });
    }
    Ok(contracts)
}

/// Load the optional overlay; an absent directory yields nothing
pub fn load_overlay(root: &Path) -> Result<Vec<Contract>, LoadError> {
    let tree = SourceTree::new(root);
    if !tree.exists() {
        tracing::debug!(path = %root.display(), "overlay source absent, skipping");
        return Ok(Vec::new());
    }
    tree.load()
}

/// Build the universe from the primary tree and an optional overlay
pub fn load_universe(primary: &Path, overlay: Option<&Path>) -> Result<Universe, LoadError> {
    let mut universe = Universe::new();

    let public = load_primary(primary)?;
    tracing::info!(path = %primary.display(), contracts = public.len(), "loaded primary contracts");
    universe.add_children(public)?;

    if let Some(overlay) = overlay {
        let private = load_overlay(overlay)?;
        if !private.is_empty() {
            tracing::info!(path = %overlay.display(), contracts = private.len(), "loaded overlay contracts");
            universe.add_children(private)?;
        }
    }

    tracing::info!(total = universe.len(), "universe ready");
    Ok(universe)
}
