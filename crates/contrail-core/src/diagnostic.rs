//! Diagnostic codes and run reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Template resolution (1xxx)
    /// A field reference could not be resolved against the context
    TemplateUnresolvedReference,

    /// A file reference could not be read from the template base directory
    TemplateUnresolvedFile,

    /// The template itself is malformed
    TemplateSyntax,

    // Query results (2xxx)
    /// A selector matched no combination of contracts
    QueryZeroMatch,

    // Graph filtering (3xxx)
    /// A contract subtree was removed by the denylist
    ContractDenylisted,

    // Artifacts (4xxx)
    /// An artifact was written to the destination tree
    ArtifactWritten,

    /// An artifact already had identical content on disk
    ArtifactUnchanged,

    // Fatal run failures (5xxx)
    /// Configuration, source tree or blueprint could not be used
    ConfigInvalid,

    /// Two contracts share one identity under the same parent
    GraphDuplicateContract,

    /// An artifact could not be written
    ArtifactWriteFailed,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateUnresolvedReference => "TEMPLATE_UNRESOLVED_REFERENCE",
            Self::TemplateUnresolvedFile => "TEMPLATE_UNRESOLVED_FILE",
            Self::TemplateSyntax => "TEMPLATE_SYNTAX",
            Self::QueryZeroMatch => "QUERY_ZERO_MATCH",
            Self::ContractDenylisted => "CONTRACT_DENYLISTED",
            Self::ArtifactWritten => "ARTIFACT_WRITTEN",
            Self::ArtifactUnchanged => "ARTIFACT_UNCHANGED",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::GraphDuplicateContract => "GRAPH_DUPLICATE_CONTRACT",
            Self::ArtifactWriteFailed => "ARTIFACT_WRITE_FAILED",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - a context was skipped but the run continued
    Warn,

    /// Error - the run should be considered failed
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Generation target the diagnostic belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Context label (image name or output path) or contract identity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// File involved (blueprint, contract document or artifact)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            target: None,
            subject: None,
            file: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}
