//! Loader errors

use contrail_core::GraphError;
use std::path::PathBuf;

/// Errors raised while reading contract source trees
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Contract source {} does not exist or contains no contracts", path.display())]
    MissingSource { path: PathBuf },

    #[error("Invalid contract document {}: {message}", path.display())]
    InvalidDocument { path: PathBuf, message: String },

    #[error("Failed to read {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl LoadError {
    pub(crate) fn invalid(path: &std::path::Path, message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Duplicate contract identity, as opposed to a configuration problem
    pub fn is_graph_integrity(&self) -> bool {
        matches!(self, Self::Graph(_))
    }
}
