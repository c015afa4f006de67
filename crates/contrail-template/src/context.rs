//! Render context
//!
//! Top-level names are role names (bound to a contract's view) and derived
//! fields such as `path` or `imageName`.

use contrail_core::contract::step;
use contrail_core::Contract;
use minijinja::Value as MinijinjaValue;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Values visible to a template
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RenderContext {
    values: BTreeMap<String, Value>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level value
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Bind a role name to a contract view
    pub fn bind(&mut self, role: impl Into<String>, contract: &Contract) -> &mut Self {
        self.insert(role, contract.to_value())
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Resolve a dotted reference such as `os.data.arch`
    pub fn resolve(&self, reference: &str) -> Option<&Value> {
        let mut segments = reference.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Whether a reference is known to be missing.
    ///
    /// A walk that reaches a scalar before the path ends is left to the
    /// engine (`os.slug.upper` names a method, not a field).
    pub fn is_unresolved(&self, reference: &str) -> bool {
        let mut segments = reference.split('.');
        let Some(first) = segments.next() else {
            return true;
        };
        let Some(mut current) = self.values.get(first) else {
            return true;
        };
        for segment in segments {
            match current {
                Value::Object(_) | Value::Array(_) => match step(current, segment) {
                    Some(next) => current = next,
                    None => return true,
                },
                _ => return false,
            }
        }
        false
    }

    /// Convert to a MiniJinja value for rendering
    pub fn to_minijinja_value(&self) -> MinijinjaValue {
        MinijinjaValue::from_serialize(&self.values)
    }
}
