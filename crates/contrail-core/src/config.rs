//! Configuration schema (contrail.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::contract::Contract;
use crate::matcher::{Matcher, SlugPattern};

/// Contract source trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Required tree of contract documents
    #[serde(default = "default_primary")]
    pub primary: PathBuf,

    /// Optional private overlay, skipped when absent
    #[serde(default = "default_overlay", skip_serializing_if = "Option::is_none")]
    pub overlay: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            overlay: default_overlay(),
        }
    }
}

/// Contracts excluded from the generation universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenylistRules {
    /// Contract type the slugs apply to
    #[serde(rename = "type", default = "default_denylist_type")]
    pub contract_type: String,

    /// Slugs to exclude (`*` wildcards allowed)
    #[serde(default = "default_denylist_slugs")]
    pub slugs: Vec<String>,
}

impl Default for DenylistRules {
    fn default() -> Self {
        Self {
            contract_type: default_denylist_type(),
            slugs: default_denylist_slugs(),
        }
    }
}

impl DenylistRules {
    /// One matcher per slug; globs become anchored slug patterns
    pub fn matchers(&self) -> Result<Vec<Matcher>, ConfigError> {
        self.slugs
            .iter()
            .map(|slug| {
                if slug.contains('*') {
                    let pattern = SlugPattern::from_glob(slug)
                        .map_err(|e| ConfigError::InvalidValue(format!("denylist slug '{}': {}", slug, e)))?;
                    Ok(Matcher::Type(self.contract_type.clone()).and(Matcher::SlugPattern(pattern)))
                } else {
                    Ok(Contract::create_matcher(self.contract_type.clone(), slug.clone()))
                }
            })
            .collect()
    }
}

/// One generation target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target name, e.g. `os-contracts`
    pub name: String,

    /// Blueprint file
    pub blueprint: PathBuf,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Root of the generated tree
    #[serde(default = "default_destination")]
    pub destination: PathBuf,

    /// Base directory for `file()` references, defaults to the primary source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_base: Option<PathBuf>,

    /// Contract source trees
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Denylist applied once before any query
    #[serde(default)]
    pub denylist: DenylistRules,

    /// Generation targets in execution order
    #[serde(default = "default_targets")]
    pub targets: Vec<TargetConfig>,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            template_base: None,
            sources: SourcesConfig::default(),
            denylist: DenylistRules::default(),
            targets: default_targets(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate or empty target names
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::BTreeSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(ConfigError::InvalidValue("target with empty name".into()));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!("duplicate target '{}'", target.name)));
            }
        }
        Ok(())
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn primary_source(&self) -> PathBuf {
        self.resolve(&self.sources.primary)
    }

    pub fn overlay_source(&self) -> Option<PathBuf> {
        self.sources.overlay.as_deref().map(|p| self.resolve(p))
    }

    pub fn destination_dir(&self) -> PathBuf {
        self.resolve(&self.destination)
    }

    pub fn template_base_dir(&self) -> PathBuf {
        match &self.template_base {
            Some(base) => self.resolve(base),
            None => self.primary_source(),
        }
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }
}

fn default_primary() -> PathBuf {
    PathBuf::from("contracts")
}

fn default_overlay() -> Option<PathBuf> {
    Some(PathBuf::from("private-contracts"))
}

fn default_destination() -> PathBuf {
    PathBuf::from("build/contracts")
}

fn default_denylist_type() -> String {
    "sw.os".to_string()
}

fn default_denylist_slugs() -> Vec<String> {
    ["alpine", "debian", "ubuntu", "fedora", "resinos"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_targets() -> Vec<TargetConfig> {
    vec![TargetConfig {
        name: "os-contracts".to_string(),
        blueprint: PathBuf::from("blueprints/os-contracts.yaml"),
    }]
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}
