//! Contract document parsing
//!
//! A document is a JSON or YAML file holding one contract object, or an
//! array of them. `type` and `slug` are required; `version`, `name`,
//! `requires`, `provides` and `children` are interpreted; every other field
//! is kept as opaque attributes.

use contrail_core::{Capability, Contract, ContractKey, Requirement};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::LoadError;

/// Supported document encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Format from the file extension, `None` for non-documents
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("yaml") | Some("yml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Read and parse one document file
pub fn read_document(path: &Path) -> Result<Vec<Contract>, LoadError> {
    let format = DocumentFormat::from_path(path)
        .ok_or_else(|| LoadError::invalid(path, "unsupported document extension"))?;
    let text = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let contracts = parse_document(&text, format, path)?;
    tracing::debug!(path = %path.display(), contracts = contracts.len(), "loaded contract document");
    Ok(contracts)
}

/// Parse document text; `source` is recorded on every contract
pub fn parse_document(text: &str, format: DocumentFormat, source: &Path) -> Result<Vec<Contract>, LoadError> {
    let value: Value = match format {
        DocumentFormat::Json => {
            serde_json::from_str(text).map_err(|e| LoadError::invalid(source, e.to_string()))?
        }
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(text).map_err(|e| LoadError::invalid(source, e.to_string()))?;
            serde_json::to_value(yaml).map_err(|e| LoadError::invalid(source, e.to_string()))?
        }
    };

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| contract_from_value(item, source))
            .collect(),
        other => Ok(vec![contract_from_value(other, source)?]),
    }
}

/// Build a contract (and its inline children) from a document value
pub fn contract_from_value(value: Value, source: &Path) -> Result<Contract, LoadError> {
    let Value::Object(mut fields) = value else {
        return Err(LoadError::invalid(source, "contract must be an object"));
    };

    let contract_type = required_string(&mut fields, "type", source)?;
    let slug = required_string(&mut fields, "slug", source)?;
    let mut key = ContractKey::new(contract_type, slug);
    key.version = optional_scalar(&mut fields, "version", source)?;
    let name = optional_scalar(&mut fields, "name", source)?;

    let requires: Vec<Requirement> = take_list(&mut fields, "requires", source)?;
    let provides: Vec<Capability> = take_list(&mut fields, "provides", source)?;
    let children = fields.remove("children");

    let mut contract = Contract::from_key(key)
        .with_attributes(fields)
        .with_source(source);
    if let Some(name) = name {
        contract = contract.with_name(name);
    }
    for requirement in requires {
        contract = contract.with_requirement(requirement);
    }
    for capability in provides {
        contract = contract.with_capability(capability);
    }

    if let Some(children) = children {
        let mut declared = Vec::new();
        flatten_children(children, &mut declared, source)?;
        for child in declared {
            contract.add_child(contract_from_value(child, source)?)?;
        }
    }

    Ok(contract)
}

/// Inline children may be an array, or maps nested by arbitrary grouping
/// keys (`children: { arch: { sw: { armv7hf: {...} } } }`).
fn flatten_children(value: Value, out: &mut Vec<Value>, source: &Path) -> Result<(), LoadError> {
    match value {
        Value::Object(map) if looks_like_contract(&map) => {
            out.push(Value::Object(map));
            Ok(())
        }
        Value::Object(map) => {
            for (_, nested) in map {
                flatten_children(nested, out, source)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                flatten_children(item, out, source)?;
            }
            Ok(())
        }
        Value::Null => Ok(()),
        other => Err(LoadError::invalid(
            source,
            format!("unexpected value in children: {}", other),
        )),
    }
}

fn looks_like_contract(map: &Map<String, Value>) -> bool {
    matches!(map.get("type"), Some(Value::String(_))) && matches!(map.get("slug"), Some(Value::String(_)))
}

fn required_string(fields: &mut Map<String, Value>, key: &str, source: &Path) -> Result<String, LoadError> {
    match fields.remove(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(LoadError::invalid(source, format!("field '{}' must be a non-empty string", key))),
        None => Err(LoadError::invalid(source, format!("missing required field '{}'", key))),
    }
}

/// Strings pass through; numbers (`version: 1.0` in YAML) are stringified
fn optional_scalar(fields: &mut Map<String, Value>, key: &str, source: &Path) -> Result<Option<String>, LoadError> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(LoadError::invalid(source, format!("field '{}' must be a string", key))),
    }
}

fn take_list<T: serde::de::DeserializeOwned>(
    fields: &mut Map<String, Value>,
    key: &str,
    source: &Path,
) -> Result<Vec<T>, LoadError> {
    match fields.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| LoadError::invalid(source, format!("field '{}': {}", key, e))),
    }
}
