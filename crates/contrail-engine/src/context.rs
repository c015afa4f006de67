//! Query contexts
//!
//! A context binds every role of a selector to one contract of the universe,
//! plus the derived fields rendered for that binding.

use contrail_core::Contract;
use contrail_template::RenderContext;
use serde_json::Value;
use std::collections::BTreeMap;

/// Field used as the human label of a context when present
pub const LABEL_FIELD: &str = "imageName";

/// One surviving combination of a query
#[derive(Debug, Clone, PartialEq)]
pub struct Context<'u> {
    bindings: Vec<(String, &'u Contract)>,
    fields: BTreeMap<String, String>,
    path: String,
}

impl<'u> Context<'u> {
    pub(crate) fn new(bindings: Vec<(String, &'u Contract)>, fields: BTreeMap<String, String>, path: String) -> Self {
        Self { bindings, fields, path }
    }

    /// Role bindings in selector order
    pub fn bindings(&self) -> &[(String, &'u Contract)] {
        &self.bindings
    }

    pub fn get(&self, role: &str) -> Option<&'u Contract> {
        self.bindings.iter().find(|(name, _)| name == role).map(|(_, c)| *c)
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Output directory relative to the destination
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `imageName` if derived, else the output path
    pub fn label(&self) -> &str {
        self.field(LABEL_FIELD).unwrap_or(&self.path)
    }

    /// `os=sw.os/balenaos@2.100.0, device=hw.device-type/raspberrypi3`
    pub fn describe(&self) -> String {
        describe_bindings(&self.bindings)
    }

    /// Roles, derived fields and `path` as template values
    pub fn to_render_context(&self) -> RenderContext {
        let mut ctx = bindings_context(&self.bindings);
        for (name, value) in &self.fields {
            ctx.insert(name.clone(), Value::String(value.clone()));
        }
        ctx.insert("path", Value::String(self.path.clone()));
        ctx
    }
}

pub(crate) fn bindings_context(bindings: &[(String, &Contract)]) -> RenderContext {
    let mut ctx = RenderContext::new();
    for (role, contract) in bindings {
        ctx.bind(role.clone(), contract);
    }
    ctx
}

pub(crate) fn describe_bindings(bindings: &[(String, &Contract)]) -> String {
    bindings
        .iter()
        .map(|(role, contract)| format!("{}={}", role, contract.key()))
        .collect::<Vec<_>>()
        .join(", ")
}
