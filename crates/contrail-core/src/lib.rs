//! Contrail Core
//!
//! Contract graph model shared by every crate: contracts, matchers, the
//! universe, diagnostics and configuration.
//! Never rename diagnostic codes - they are part of the public API.

pub mod contract;
pub mod matcher;
pub mod universe;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use contract::{Capability, Contract, ContractKey, ContractPath, Requirement};
pub use matcher::{Matcher, Relation, SlugPattern};
pub use universe::{GraphError, Universe, UNIVERSE_TYPE};
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use report::{ArtifactRecord, ArtifactStatus, Report, ReportSummary, ReportVersion, TargetSummary};
pub use config::{Config, ConfigError, DenylistRules, SourcesConfig, TargetConfig};
