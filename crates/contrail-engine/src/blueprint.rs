//! Blueprint files
//!
//! A blueprint pairs a selector (roles and cross-role constraints) with an
//! output descriptor (filename, path, derived fields and template body).
//!
//! ```yaml
//! selector:
//!   roles:
//!     - name: os
//!       match: { all: [ { type: sw.os }, { not: { slug: alpine } } ] }
//!     - name: device
//!       match: { type: hw.device-type }
//!   constraints:
//!     - { requires: device, provided_by: os, capability: arch.sw }
//! output:
//!   filename: contract.json
//!   path: "{{ device.slug }}/{{ os.slug }}"
//!   fields:
//!     imageName: "{{ os.slug }}-{{ device.slug }}"
//!   template:
//!     - data: '{ "slug": "{{ device.slug }}" }'
//! ```

use contrail_core::{Matcher, Relation};
use contrail_template::HELPERS;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Blueprint loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum BlueprintError {
    #[error("Failed to read blueprint {}: {message}", path.display())]
    Io { path: PathBuf, message: String },

    #[error("Invalid blueprint {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

impl BlueprintError {
    fn invalid(path: &Path, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// One named slot of a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,

    #[serde(rename = "match")]
    pub matcher: Matcher,
}

/// `requires` role's requirements must be met by `provided_by` role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub requires: String,

    pub provided_by: String,

    /// Restrict the check to requirements of this capability type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl Constraint {
    pub fn relation(&self) -> Relation {
        match &self.capability {
            Some(capability_type) => Relation::on(capability_type.clone()),
            None => Relation::all(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selector {
    pub roles: Vec<Role>,

    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl Selector {
    pub fn role_index(&self, name: &str) -> Option<usize> {
        self.roles.iter().position(|r| r.name == name)
    }
}

/// One piece of a multi-part template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplatePart {
    pub data: String,
}

/// Where the artifact template comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateSource {
    Inline(String),

    /// File relative to the blueprint
    File { file: PathBuf },

    /// Parts concatenated in order
    Parts(Vec<TemplatePart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Artifact file name, itself a template
    pub filename: String,

    /// Directory under the destination; defaults to the bound slugs joined by `/`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Derived fields such as `imageName`
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    pub template: TemplateSource,
}

/// A parsed and validated blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub selector: Selector,

    pub output: OutputDescriptor,

    /// Resolved template text
    #[serde(skip)]
    body: String,
}

impl Blueprint {
    /// Load a blueprint file; `{ file: ... }` templates resolve next to it
    pub fn from_file(path: &Path) -> Result<Self, BlueprintError> {
        let text = std::fs::read_to_string(path).map_err(|e| BlueprintError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let blueprint = Self::parse(&text, path, base)?;
        tracing::debug!(
            path = %path.display(),
            roles = blueprint.selector.roles.len(),
            constraints = blueprint.selector.constraints.len(),
            "loaded blueprint"
        );
        Ok(blueprint)
    }

    /// Parse YAML text; `origin` names the blueprint in errors
    pub fn parse(text: &str, origin: &Path, base: &Path) -> Result<Self, BlueprintError> {
        let mut blueprint: Blueprint =
            serde_yaml::from_str(text).map_err(|e| BlueprintError::invalid(origin, e.to_string()))?;
        blueprint.validate().map_err(|message| BlueprintError::invalid(origin, message))?;
        blueprint.body = match &blueprint.output.template {
            TemplateSource::Inline(text) => text.clone(),
            TemplateSource::Parts(parts) => parts.iter().map(|p| p.data.as_str()).collect(),
            TemplateSource::File { file } => {
                let full = base.join(file);
                std::fs::read_to_string(&full).map_err(|e| {
                    BlueprintError::invalid(origin, format!("template {}: {}", full.display(), e))
                })?
            }
        };
        Ok(blueprint)
    }

    /// Template text the artifacts are rendered from
    pub fn body(&self) -> &str {
        &self.body
    }

    fn validate(&self) -> Result<(), String> {
        if self.selector.roles.is_empty() {
            return Err("selector declares no roles".into());
        }

        let mut names = BTreeSet::new();
        for role in &self.selector.roles {
            if role.name.trim().is_empty() {
                return Err("role with empty name".into());
            }
            if HELPERS.contains(&role.name.as_str()) {
                return Err(format!("role name '{}' is reserved by the template engine", role.name));
            }
            if !names.insert(role.name.as_str()) {
                return Err(format!("duplicate role '{}'", role.name));
            }
        }

        for constraint in &self.selector.constraints {
            for role in [&constraint.requires, &constraint.provided_by] {
                if !names.contains(role.as_str()) {
                    return Err(format!("constraint references undeclared role '{}'", role));
                }
            }
            if constraint.requires == constraint.provided_by {
                return Err(format!("constraint relates role '{}' to itself", constraint.requires));
            }
        }

        for field in self.output.fields.keys() {
            if names.contains(field.as_str()) || field == "path" {
                return Err(format!("field '{}' shadows a role or the output path", field));
            }
            if HELPERS.contains(&field.as_str()) {
                return Err(format!("field name '{}' is reserved by the template engine", field));
            }
        }

        if self.output.filename.trim().is_empty() {
            return Err("output filename is empty".into());
        }
        Ok(())
    }
}
