//! Template rendering for contract contexts
//!
//! This crate handles:
//! - Rendering blueprint templates against a bound context (minijinja)
//! - Strict undefined handling, naming the missing field on failure
//! - Inlining snippet files through `file("relative/path")`
//! - Mapping failures to stable diagnostics

pub mod context;
pub mod functions;
pub mod renderer;

pub use context::RenderContext;
pub use functions::{resolve_snippet, FileResolver};
pub use renderer::{RenderError, TemplateRenderer, HELPERS};
