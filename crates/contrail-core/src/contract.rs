//! Contract nodes and their identity types
//!
//! A contract is one build-relevant entity (OS variant, device type,
//! architecture, ...) with a type, a slug, an optional version and an opaque
//! attribute payload. Children are owned by their parent; the parent link is
//! a [`ContractPath`] lookup only.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::universe::GraphError;

/// Identity of a contract among its siblings: (type, slug, version)
///
/// Ordering is type, then slug, then version (unversioned first), which is
/// the traversal order of every child collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractKey {
    /// Category string, e.g. `sw.os`
    #[serde(rename = "type")]
    pub contract_type: String,

    /// Identifier unique within type + version
    pub slug: String,

    /// Optional version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ContractKey {
    pub fn new(contract_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            contract_type: contract_type.into(),
            slug: slug.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl std::fmt::Display for ContractKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.contract_type, self.slug)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

/// Location of a contract in the universe: the keys from the root down
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractPath(Vec<ContractKey>);

impl ContractPath {
    /// The universe root
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a child of this node
    pub fn child(&self, key: ContractKey) -> Self {
        let mut keys = self.0.clone();
        keys.push(key);
        Self(keys)
    }

    /// Path of the parent node, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn keys(&self) -> &[ContractKey] {
        &self.0
    }

    pub fn last(&self) -> Option<&ContractKey> {
        self.0.last()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Whether `self` is `other` or one of its ancestors
    pub fn contains(&self, other: &ContractPath) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl std::fmt::Display for ContractPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<universe>");
        }
        let parts: Vec<String> = self.0.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", parts.join(" > "))
    }
}

/// A tagged capability a contract provides or requires
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub capability_type: String,

    pub slug: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Capability {
    pub fn new(capability_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            capability_type: capability_type.into(),
            slug: slug.into(),
            version: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Whether `provided` fulfils this capability when used as a requirement.
    ///
    /// An unversioned requirement accepts any version.
    pub fn is_satisfied_by(&self, provided: &Capability) -> bool {
        if self.capability_type != provided.capability_type || self.slug != provided.slug {
            return false;
        }
        match &self.version {
            Some(version) => provided.version.as_deref() == Some(version.as_str()),
            None => true,
        }
    }
}

impl From<&ContractKey> for Capability {
    fn from(key: &ContractKey) -> Self {
        Self {
            capability_type: key.contract_type.clone(),
            slug: key.slug.clone(),
            version: key.version.clone(),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.capability_type, self.slug)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

/// A requirement declared by a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Requirement {
    /// Any one of the alternatives
    AnyOf { or: Vec<Capability> },

    /// Exactly this capability
    One(Capability),
}

impl Requirement {
    pub fn alternatives(&self) -> &[Capability] {
        match self {
            Self::AnyOf { or } => or,
            Self::One(capability) => std::slice::from_ref(capability),
        }
    }

    /// Whether any alternative has the given capability type
    pub fn concerns(&self, capability_type: &str) -> bool {
        self.alternatives()
            .iter()
            .any(|c| c.capability_type == capability_type)
    }

    pub fn is_satisfied_by(&self, provided: &[Capability]) -> bool {
        self.alternatives()
            .iter()
            .any(|wanted| provided.iter().any(|p| wanted.is_satisfied_by(p)))
    }
}

/// A contract node
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    key: ContractKey,
    name: Option<String>,
    attributes: Map<String, Value>,
    requires: Vec<Requirement>,
    provides: Vec<Capability>,
    children: BTreeMap<ContractKey, Contract>,
    parent: Option<ContractPath>,
    source: Option<PathBuf>,
}

impl Contract {
    pub fn new(contract_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::from_key(ContractKey::new(contract_type, slug))
    }

    pub fn from_key(key: ContractKey) -> Self {
        Self {
            key,
            name: None,
            attributes: Map::new(),
            requires: Vec::new(),
            provides: Vec::new(),
            children: BTreeMap::new(),
            parent: None,
            source: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.key.version = Some(version.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requires.push(requirement);
        self
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.provides.push(capability);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn key(&self) -> &ContractKey {
        &self.key
    }

    pub fn contract_type(&self) -> &str {
        &self.key.contract_type
    }

    pub fn slug(&self) -> &str {
        &self.key.slug
    }

    pub fn version(&self) -> Option<&str> {
        self.key.version.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn requires(&self) -> &[Requirement] {
        &self.requires
    }

    pub fn provides(&self) -> &[Capability] {
        &self.provides
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Source file for diagnostics, `<inline>` when built in memory
    pub fn source_label(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string())
    }

    /// Non-owning link to the parent, `None` while detached
    pub fn parent(&self) -> Option<&ContractPath> {
        self.parent.as_ref()
    }

    /// Location of this contract; a detached contract is its own root
    pub fn path(&self) -> ContractPath {
        self.parent
            .clone()
            .unwrap_or_default()
            .child(self.key.clone())
    }

    /// Children in key order
    pub fn children(&self) -> impl Iterator<Item = &Contract> {
        self.children.values()
    }

    pub fn child(&self, key: &ContractKey) -> Option<&Contract> {
        self.children.get(key)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Attach a child, rejecting a sibling with the same key
    pub fn add_child(&mut self, mut child: Contract) -> Result<(), GraphError> {
        if let Some(existing) = self.children.get(&child.key) {
            return Err(GraphError::DuplicateContract {
                key: child.key.clone(),
                first: existing.source_label(),
                second: child.source_label(),
            });
        }
        child.reparent(Some(self.path()));
        self.children.insert(child.key.clone(), child);
        Ok(())
    }

    pub(crate) fn child_mut(&mut self, key: &ContractKey) -> Option<&mut Contract> {
        self.children.get_mut(key)
    }

    pub(crate) fn take_child(&mut self, key: &ContractKey) -> Option<Contract> {
        self.children.remove(key)
    }

    pub(crate) fn insert_child_unchecked(&mut self, mut child: Contract, parent: ContractPath) {
        child.reparent(Some(parent));
        self.children.insert(child.key.clone(), child);
    }

    /// Rewrite the parent links of this subtree
    pub(crate) fn reparent(&mut self, parent: Option<ContractPath>) {
        self.parent = parent;
        let own = self.path();
        for child in self.children.values_mut() {
            child.reparent(Some(own.clone()));
        }
    }

    /// Detach from any parent, leaving the subtree internally consistent
    pub fn detached(mut self) -> Self {
        self.reparent(None);
        self
    }

    /// All descendants in depth-first pre-order
    pub fn descendants(&self) -> Vec<&Contract> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a Contract>) {
        for child in self.children.values() {
            out.push(child);
            child.collect_descendants(out);
        }
    }

    /// Lookup by dot path into the attribute payload (`data.arch`, `assets.0`)
    pub fn attribute(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.attributes.get(first)?;
        for segment in segments {
            current = step(current, segment)?;
        }
        Some(current)
    }

    /// Alternative slugs declared under `aliases`
    pub fn aliases(&self) -> Vec<&str> {
        self.attributes
            .get("aliases")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn answers_to(&self, slug: &str) -> bool {
        self.slug() == slug || self.aliases().contains(&slug)
    }

    /// Matcher for contracts of `contract_type` answering to `slug`
    pub fn create_matcher(contract_type: impl Into<String>, slug: impl Into<String>) -> crate::matcher::Matcher {
        crate::matcher::Matcher::create(contract_type, slug)
    }

    /// Declared `provides` plus the identity (and aliases) of this contract
    /// and every descendant
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut capabilities = self.provides.clone();
        self.push_identity(&mut capabilities);
        for descendant in self.descendants() {
            descendant.push_identity(&mut capabilities);
        }
        capabilities
    }

    fn view_key(&self) -> String {
        match &self.key.version {
            Some(version) => format!("{}@{}", self.key.slug, version),
            None => self.key.slug.clone(),
        }
    }

    fn push_identity(&self, out: &mut Vec<Capability>) {
        let own = Capability::from(self.key());
        for alias in self.aliases() {
            out.push(Capability {
                slug: alias.to_string(),
                ..own.clone()
            });
        }
        out.push(own);
    }

    /// Template-facing view: core fields, attributes, relations and children
    /// grouped as `children.<type>.<slug>` (`<slug>@<version>` for versioned
    /// children, so versioned siblings stay distinct).
    pub fn to_value(&self) -> Value {
        let mut view = self.attributes.clone();
        view.insert("type".into(), Value::String(self.key.contract_type.clone()));
        view.insert("slug".into(), Value::String(self.key.slug.clone()));
        if let Some(version) = &self.key.version {
            view.insert("version".into(), Value::String(version.clone()));
        }
        if let Some(name) = &self.name {
            view.insert("name".into(), Value::String(name.clone()));
        }
        if !self.requires.is_empty() {
            view.insert(
                "requires".into(),
                serde_json::to_value(&self.requires).unwrap_or(Value::Null),
            );
        }
        if !self.provides.is_empty() {
            view.insert(
                "provides".into(),
                serde_json::to_value(&self.provides).unwrap_or(Value::Null),
            );
        }
        if !self.children.is_empty() {
            let mut grouped: Map<String, Value> = Map::new();
            for child in self.children.values() {
                let bucket = grouped
                    .entry(child.contract_type().to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(bucket) = bucket {
                    bucket.insert(child.view_key(), child.to_value());
                }
            }
            view.insert("children".into(), Value::Object(grouped));
        }
        Value::Object(view)
    }
}

/// One step of a dot path: object key or array index
pub fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
