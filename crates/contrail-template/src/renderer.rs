//! Template rendering
//!
//! Renders blueprint templates (filenames, derived fields and artifact
//! bodies) against a [`RenderContext`].

use contrail_core::{Diagnostic, DiagnosticCode, Severity};
use minijinja::{AutoEscape, Environment, ErrorKind, Template, UndefinedBehavior};
use std::path::{Path, PathBuf};

use crate::context::RenderContext;
use crate::functions::FileResolver;

/// Names provided by the environment rather than the context; blueprints
/// may not use them as role or field names
pub const HELPERS: &[&str] = &["file", "range", "dict", "namespace", "debug", "loop"];

/// Errors that abort rendering of one context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("Unresolved reference '{reference}'")]
    UnresolvedReference { reference: String },

    #[error("Unresolved file '{path}'")]
    UnresolvedFile { path: String },

    #[error("Template syntax error: {message}")]
    Syntax { message: String },
}

impl RenderError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            RenderError::UnresolvedReference { .. } => DiagnosticCode::TemplateUnresolvedReference,
            RenderError::UnresolvedFile { .. } => DiagnosticCode::TemplateUnresolvedFile,
            RenderError::Syntax { .. } => DiagnosticCode::TemplateSyntax,
        }
    }

    /// Convert to a warning diagnostic; the run continues without this context
    pub fn to_diagnostic(&self) -> Diagnostic {
        let diag = Diagnostic::new(self.code(), Severity::Warn, self.to_string());
        match self {
            RenderError::UnresolvedReference { reference } => diag.with_subject(reference.clone()),
            RenderError::UnresolvedFile { path } => diag.with_file(path.clone()),
            RenderError::Syntax { .. } => diag,
        }
    }
}

/// Strict Jinja renderer with file inclusion
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    base_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    /// Renderer whose `file()` reads relative to `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Renderer where every `file()` call fails
    pub fn without_files() -> Self {
        Self { base_dir: None }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Check if text contains template syntax
    pub fn has_references(template: &str) -> bool {
        template.contains("{{") || template.contains("{%") || template.contains("{#")
    }

    /// Render `template` against `context`.
    ///
    /// Undefined values fail at evaluation time, so guarded or untaken
    /// branches may mention fields a contract lacks. A failure is named
    /// after the first referenced path (in sorted order) missing from the
    /// context.
    pub fn render(&self, template: &str, context: &RenderContext) -> Result<String, RenderError> {
        if !Self::has_references(template) {
            return Ok(template.to_string());
        }

        let resolver = FileResolver::new(self.base_dir.clone());
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);

        let reader = resolver.clone();
        env.add_function("file", move |path: String| reader.read(&path));

        let compiled = env.template_from_str(template).map_err(|e| RenderError::Syntax {
            message: e.to_string(),
        })?;

        compiled
            .render(context.to_minijinja_value())
            .map_err(|e| Self::classify(e, &compiled, context, &resolver))
    }

    fn first_unresolved(compiled: &Template<'_, '_>, context: &RenderContext) -> Option<String> {
        let mut references: Vec<String> = compiled.undeclared_variables(true).into_iter().collect();
        references.sort();
        references.into_iter().find(|reference| {
            let root = reference.split('.').next().unwrap_or_default();
            !HELPERS.contains(&root) && context.is_unresolved(reference)
        })
    }

    fn classify(
        error: minijinja::Error,
        compiled: &Template<'_, '_>,
        context: &RenderContext,
        resolver: &FileResolver,
    ) -> RenderError {
        if let Some(path) = resolver.failure() {
            return RenderError::UnresolvedFile { path };
        }
        match error.kind() {
            ErrorKind::UndefinedError => RenderError::UnresolvedReference {
                reference: Self::first_unresolved(compiled, context)
                    .or_else(|| error.detail().map(str::to_string))
                    .unwrap_or_else(|| error.to_string()),
            },
            _ => RenderError::Syntax {
                message: error.to_string(),
            },
        }
    }
}
