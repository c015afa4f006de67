use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use contrail_core::{ArtifactStatus, Config, Report, Severity};
use contrail_engine::Generator;

const DEFAULT_CONFIG: &str = "contrail.toml";

/// Contrail - contract graph queries and artifact generation
#[derive(Parser)]
#[command(name = "contrail")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: contrail.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate artifacts for every configured target
    Generate {
        /// Render everything but write nothing
        #[arg(long)]
        dry_run: bool,

        /// Output file for report.json
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Exit non-zero when any context was skipped
        #[arg(long)]
        strict: bool,
    },

    /// List the contexts a target resolves to, without writing
    Query {
        /// Target name from the configuration
        target: String,

        /// Print contexts as JSON
        #[arg(long)]
        json: bool,
    },

    /// List contracts in the filtered universe
    List {
        /// Only contracts of this type
        #[arg(short = 't', long = "type")]
        contract_type: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Generate { dry_run, report, strict } => generate_command(config, dry_run, report.as_deref(), strict),
        Commands::Query { target, json } => query_command(config, &target, json),
        Commands::List { contract_type } => list_command(config, contract_type.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("loading {}", path.display()));
    }

    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        tracing::debug!(path = %default.display(), "Using config from working directory");
        return Ok(Config::from_file(default)?);
    }

    if verbose {
        eprintln!("{}", "No config file found, using defaults".yellow());
    }
    Ok(Config::default())
}

/// Generate command - full run over every target
fn generate_command(config: Config, dry_run: bool, report_path: Option<&Path>, strict: bool) -> Result<()> {
    let report = match Generator::new(config).dry_run(dry_run).run() {
        Ok(report) => report,
        Err(error) => {
            if let Some(path) = report_path {
                let mut failed = Report::new();
                failed.add_diagnostic(error.to_diagnostic());
                failed.save_to_file(path)?;
                eprintln!("{} {}", "Report saved to:".green(), path.display());
            }
            return Err(error.into());
        }
    };

    if let Some(path) = report_path {
        report.save_to_file(path)?;
        eprintln!("{} {}", "Report saved to:".green(), path.display());
    }

    print_report_summary(&report, dry_run);

    if strict && report.has_skipped() {
        eprintln!(
            "{}",
            format!("{} context(s) skipped in strict mode", report.summary.skipped).red().bold()
        );
        std::process::exit(1);
    }

    Ok(())
}

/// Query command - show the contexts of one target
fn query_command(config: Config, target: &str, json: bool) -> Result<()> {
    let plan = Generator::new(config).prepare()?;
    let result = plan.query(target)?;

    if json {
        let contexts: Vec<serde_json::Value> = result
            .contexts
            .iter()
            .map(|context| {
                let roles: serde_json::Map<String, serde_json::Value> = context
                    .bindings()
                    .iter()
                    .map(|(role, contract)| (role.clone(), serde_json::Value::String(contract.key().to_string())))
                    .collect();
                serde_json::json!({
                    "label": context.label(),
                    "path": context.path(),
                    "roles": roles,
                    "fields": context.fields(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&contexts)?);
        return Ok(());
    }

    println!("{} {}", "Target:".bold(), target.green());
    for (role, count) in &result.candidates {
        println!("  {} {} candidate(s)", format!("{}:", role).cyan(), count);
    }
    println!();

    if result.contexts.is_empty() {
        println!("{}", "No contexts matched".yellow());
    }
    for (i, context) in result.contexts.iter().enumerate() {
        println!("  {}. {} {}", i + 1, context.label().green(), format!("({})", context.path()).dimmed());
        println!("     {}", context.describe());
    }
    for skipped in &result.skipped {
        println!("  {} {}: {}", "skipped".yellow(), skipped.bindings, skipped.error);
    }

    println!();
    println!(
        "{} contexts, {} skipped, {} contracts",
        result.contexts.len(),
        result.skipped.len(),
        plan.universe.len()
    );
    Ok(())
}

/// List command - contracts remaining after the denylist
fn list_command(config: Config, contract_type: Option<&str>) -> Result<()> {
    let (universe, denylisted) = Generator::new(config).filtered_universe()?;

    let contracts: Vec<_> = universe
        .contracts()
        .into_iter()
        .filter(|c| contract_type.map_or(true, |t| c.contract_type() == t))
        .collect();

    for contract in &contracts {
        let indent = "  ".repeat(contract.path().depth().saturating_sub(1));
        let name = contract.name().map(|n| format!(" ({})", n)).unwrap_or_default();
        println!("{}{}{}", indent, contract.key().to_string().green(), name.dimmed());
    }

    println!();
    println!(
        "{} contract(s) listed, {} removed by denylist",
        contracts.len(),
        denylisted.len()
    );
    Ok(())
}

fn print_report_summary(report: &Report, dry_run: bool) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Contrail Generation Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("{} {}", "Version:".bold(), report.version);
    println!("{} {}", "Timestamp:".bold(), report.timestamp);
    if dry_run {
        println!("{}", "Dry run: nothing was written".yellow());
    }
    println!();

    for target in &report.targets {
        println!(
            "{} {}: {} context(s), {} written, {} unchanged, {} planned, {} skipped",
            "Target".bold(),
            target.name.green(),
            target.matched,
            target.count(ArtifactStatus::Written),
            target.count(ArtifactStatus::Unchanged),
            target.count(ArtifactStatus::Planned),
            target.skipped,
        );
    }
    println!();

    println!("{}", "Summary:".bold());
    println!("  Contracts:  {} ({} denylisted)", report.summary.contracts, report.summary.denylisted);
    println!("  Contexts:   {}", report.summary.contexts);
    println!("  Warnings:   {}", report.summary.warnings.to_string().yellow());
    println!("  Info:       {}", report.summary.info.to_string().cyan());
    println!();

    let notable: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.severity >= Severity::Warn)
        .collect();
    if notable.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in notable {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };
            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);
            if let Some(subject) = &diag.subject {
                println!("    in {}", subject);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_generate_flags() {
        let cli = Cli::try_parse_from(["contrail", "--verbose", "generate", "--dry-run", "--strict", "-r", "out.json"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Generate { dry_run, report, strict } => {
                assert!(dry_run);
                assert!(strict);
                assert_eq!(report, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn parses_list_type() {
        let cli = Cli::try_parse_from(["contrail", "list", "--type", "sw.os", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::List { contract_type: Some(ref t) } if t == "sw.os"));
    }
}
