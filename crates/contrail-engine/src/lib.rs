//! Contrail engine - blueprint resolution and artifact generation
//!
//! This crate implements the generation pipeline:
//! - Blueprint parsing and validation
//! - Constrained selector queries over the universe
//! - Context rendering and artifact writing
//! - Run orchestration and reporting

pub mod blueprint;
pub mod context;
pub mod generator;
pub mod query;
pub mod writer;

pub use blueprint::{Blueprint, BlueprintError, Constraint, OutputDescriptor, Role, Selector, TemplatePart, TemplateSource};
pub use context::{Context, LABEL_FIELD};
pub use generator::{GenerationError, GenerationPlan, Generator, PreparedTarget};
pub use query::{QueryEngine, QueryResult, SkippedContext};
pub use writer::{WriteError, Writer};
