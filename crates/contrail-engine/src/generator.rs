//! Generation run
//!
//! Resolves every target's blueprint, loads and filters the universe once,
//! then queries, renders and writes each target in configuration order.

use contrail_core::{
    ArtifactStatus, Config, ConfigError, Contract, Diagnostic, DiagnosticCode, Report, Severity, TargetSummary, Universe,
};
use contrail_loader::LoadError;
use contrail_template::TemplateRenderer;
use std::path::PathBuf;

use crate::blueprint::{Blueprint, BlueprintError};
use crate::query::{QueryEngine, QueryResult};
use crate::writer::{WriteError, Writer};

/// Fatal errors; nothing is generated past the failing step
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Blueprint for target '{target}' is missing: {}", path.display())]
    MissingBlueprint { target: String, path: PathBuf },

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error("Unknown target '{name}'")]
    UnknownTarget { name: String },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

impl GenerationError {
    /// Error diagnostic for a report of the failed run
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            GenerationError::Load(LoadError::Graph(_)) => DiagnosticCode::GraphDuplicateContract,
            GenerationError::Write(_) => DiagnosticCode::ArtifactWriteFailed,
            _ => DiagnosticCode::ConfigInvalid,
        };
        let diag = Diagnostic::new(code, Severity::Error, self.to_string());

        let file = match self {
            GenerationError::MissingBlueprint { path, .. } => Some(path.display().to_string()),
            GenerationError::Blueprint(BlueprintError::Io { path, .. })
            | GenerationError::Blueprint(BlueprintError::Invalid { path, .. }) => Some(path.display().to_string()),
            GenerationError::Load(LoadError::MissingSource { path })
            | GenerationError::Load(LoadError::InvalidDocument { path, .. })
            | GenerationError::Load(LoadError::Io { path, .. }) => Some(path.display().to_string()),
            GenerationError::Write(WriteError::Io { path, .. }) => Some(path.display().to_string()),
            GenerationError::Write(WriteError::Escape { path }) => Some(path.clone()),
            _ => None,
        };
        let diag = match file {
            Some(file) => diag.with_file(file),
            None => diag,
        };

        match self {
            GenerationError::MissingBlueprint { target, .. } => diag.with_target(target.clone()),
            GenerationError::UnknownTarget { name } => diag.with_target(name.clone()),
            _ => diag,
        }
    }
}

/// A configured target with its parsed blueprint
#[derive(Debug, Clone)]
pub struct PreparedTarget {
    pub name: String,
    pub path: PathBuf,
    pub blueprint: Blueprint,
}

/// Everything a run needs before the first query
#[derive(Debug)]
pub struct GenerationPlan {
    pub targets: Vec<PreparedTarget>,

    /// Filtered universe
    pub universe: Universe,

    /// Subtrees removed by the denylist
    pub denylisted: Vec<Contract>,

    pub renderer: TemplateRenderer,
}

impl GenerationPlan {
    pub fn target(&self, name: &str) -> Result<&PreparedTarget, GenerationError> {
        self.targets
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| GenerationError::UnknownTarget { name: name.to_string() })
    }

    /// Resolve one target without rendering artifacts
    pub fn query(&self, name: &str) -> Result<QueryResult<'_>, GenerationError> {
        let target = self.target(name)?;
        let engine = QueryEngine::new(&self.universe, &self.renderer);
        Ok(engine.execute(&target.blueprint.selector, &target.blueprint.output))
    }
}

/// Drives a full generation run from a configuration
pub struct Generator {
    config: Config,
    dry_run: bool,
}

impl Generator {
    pub fn new(config: Config) -> Self {
        Self { config, dry_run: false }
    }

    /// Render everything but write nothing
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Parse every target's blueprint; any missing one fails the run
    pub fn load_blueprints(&self) -> Result<Vec<PreparedTarget>, GenerationError> {
        let mut targets = Vec::with_capacity(self.config.targets.len());
        for target in &self.config.targets {
            let path = self.config.resolve(&target.blueprint);
            if !path.is_file() {
                return Err(GenerationError::MissingBlueprint {
                    target: target.name.clone(),
                    path,
                });
            }
            let blueprint = Blueprint::from_file(&path)?;
            targets.push(PreparedTarget {
                name: target.name.clone(),
                path,
                blueprint,
            });
        }
        Ok(targets)
    }

    /// Load primary and overlay sources, then apply the denylist once
    pub fn filtered_universe(&self) -> Result<(Universe, Vec<Contract>), GenerationError> {
        let overlay = self.config.overlay_source();
        let mut universe = contrail_loader::load_universe(&self.config.primary_source(), overlay.as_deref())?;

        let matchers = self.config.denylist.matchers()?;
        let denylisted = universe.apply_denylist(&matchers);
        for contract in &denylisted {
            tracing::debug!(contract = %contract.key(), "removed by denylist");
        }
        Ok((universe, denylisted))
    }

    /// Blueprints, universe and denylist, in that order
    pub fn prepare(&self) -> Result<GenerationPlan, GenerationError> {
        let targets = self.load_blueprints()?;
        let (universe, denylisted) = self.filtered_universe()?;

        Ok(GenerationPlan {
            targets,
            universe,
            denylisted,
            renderer: TemplateRenderer::new(self.config.template_base_dir()),
        })
    }

    /// Full run: prepare, then every target in order
    pub fn run(&self) -> Result<Report, GenerationError> {
        let plan = self.prepare()?;
        let writer = Writer::new(self.config.destination_dir()).dry_run(self.dry_run);

        let mut report = Report::new();
        report.summary.contracts = plan.universe.len();
        report.summary.denylisted = plan.denylisted.len();
        for contract in &plan.denylisted {
            report.add_diagnostic(
                Diagnostic::new(
                    DiagnosticCode::ContractDenylisted,
                    Severity::Info,
                    format!("Removed {} by denylist", contract.key()),
                )
                .with_subject(contract.key().to_string()),
            );
        }

        for target in &plan.targets {
            let summary = self.run_target(&plan, target, &writer, &mut report)?;
            report.add_target(summary);
        }

        Ok(report)
    }

    fn run_target(
        &self,
        plan: &GenerationPlan,
        target: &PreparedTarget,
        writer: &Writer,
        report: &mut Report,
    ) -> Result<TargetSummary, GenerationError> {
        tracing::info!(target_name = %target.name, blueprint = %target.path.display(), "running target");

        let result = plan.query(&target.name)?;
        let mut summary = TargetSummary::new(target.name.clone());
        summary.matched = result.contexts.len();

        for skipped in &result.skipped {
            report.add_diagnostic(
                skipped
                    .error
                    .to_diagnostic()
                    .with_target(target.name.clone())
                    .with_subject(skipped.bindings.clone()),
            );
            summary.skipped += 1;
        }

        if result.is_empty() {
            let candidates: Vec<String> = result
                .candidates
                .iter()
                .map(|(role, count)| format!("{}={}", role, count))
                .collect();
            tracing::info!(target_name = %target.name, candidates = %candidates.join(", "), "selector matched nothing");
            report.add_diagnostic(
                Diagnostic::new(
                    DiagnosticCode::QueryZeroMatch,
                    Severity::Info,
                    format!("Target '{}' matched no contexts ({})", target.name, candidates.join(", ")),
                )
                .with_target(target.name.clone()),
            );
        }

        let blueprint = &target.blueprint;
        for context in &result.contexts {
            let values = context.to_render_context();
            let rendered = plan
                .renderer
                .render(&blueprint.output.filename, &values)
                .and_then(|filename| Ok((filename, plan.renderer.render(blueprint.body(), &values)?)));

            let (filename, content) = match rendered {
                Ok(rendered) => rendered,
                Err(error) => {
                    tracing::warn!(target_name = %target.name, context = %context.label(), %error, "skipping context");
                    report.add_diagnostic(
                        error
                            .to_diagnostic()
                            .with_target(target.name.clone())
                            .with_subject(context.label().to_string()),
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            tracing::info!("Generating {}", context.label());
            let record = writer.write(context.label(), context.path(), &filename, &content)?;
            let outcome = match record.status {
                ArtifactStatus::Written => Some((DiagnosticCode::ArtifactWritten, "Wrote")),
                ArtifactStatus::Unchanged => Some((DiagnosticCode::ArtifactUnchanged, "Unchanged")),
                ArtifactStatus::Planned => None,
            };
            if let Some((code, verb)) = outcome {
                report.add_diagnostic(
                    Diagnostic::new(code, Severity::Info, format!("{} {}", verb, record.path))
                        .with_target(target.name.clone())
                        .with_subject(record.label.clone()),
                );
            }
            summary.artifacts.push(record);
        }

        tracing::info!(
            target_name = %target.name,
            "Generated {} results out of {} contracts",
            summary.artifacts.len(),
            plan.universe.children().count()
        );
        Ok(summary)
    }
}
