//! Contract predicates
//!
//! [`Matcher`] selects single contracts; [`Relation`] checks requires/provides
//! compatibility between two contracts.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::contract::{Capability, Contract, Requirement};

/// A composable predicate over a contract's type, slug, version and attributes
///
/// Externally tagged, so in a blueprint it reads as `{ type: sw.os }` or
/// `{ all: [ ... ] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Matcher {
    /// Matches every contract
    Any,

    Type(String),

    /// Slug or one of its aliases
    Slug(String),

    SlugPattern(SlugPattern),

    Version(String),

    /// Attribute at a dot path equals a value
    Attribute { path: String, equals: Value },

    HasAttribute(String),

    /// Contract's effective capabilities satisfy this capability
    Provides(Capability),

    /// Contract declares a requirement this capability would satisfy
    Requires(Capability),

    All(Vec<Matcher>),

    AnyOf(Vec<Matcher>),

    Not(Box<Matcher>),
}

impl Matcher {
    /// Type + slug matcher, the shape used for denylist entries
    pub fn create(contract_type: impl Into<String>, slug: impl Into<String>) -> Self {
        Self::All(vec![Self::Type(contract_type.into()), Self::Slug(slug.into())])
    }

    pub fn and(self, other: Matcher) -> Self {
        match self {
            Self::All(mut items) => {
                items.push(other);
                Self::All(items)
            }
            first => Self::All(vec![first, other]),
        }
    }

    pub fn or(self, other: Matcher) -> Self {
        match self {
            Self::AnyOf(mut items) => {
                items.push(other);
                Self::AnyOf(items)
            }
            first => Self::AnyOf(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, contract: &Contract) -> bool {
        match self {
            Self::Any => true,
            Self::Type(t) => contract.contract_type() == t,
            Self::Slug(slug) => contract.answers_to(slug),
            Self::SlugPattern(pattern) => {
                pattern.is_match(contract.slug())
                    || contract.aliases().iter().any(|a| pattern.is_match(a))
            }
            Self::Version(version) => contract.version() == Some(version.as_str()),
            Self::Attribute { path, equals } => contract.attribute(path) == Some(equals),
            Self::HasAttribute(path) => contract.attribute(path).is_some(),
            Self::Provides(wanted) => contract
                .capabilities()
                .iter()
                .any(|provided| wanted.is_satisfied_by(provided)),
            Self::Requires(offered) => contract
                .requires()
                .iter()
                .any(|r| r.is_satisfied_by(std::slice::from_ref(offered))),
            Self::All(items) => items.iter().all(|m| m.matches(contract)),
            Self::AnyOf(items) => items.iter().any(|m| m.matches(contract)),
            Self::Not(inner) => !inner.matches(contract),
        }
    }
}

/// Compiled slug regex that round-trips through serde as its source string
#[derive(Debug, Clone)]
pub struct SlugPattern(Regex);

impl SlugPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    /// Glob with `*` wildcards, anchored at both ends
    pub fn from_glob(glob: &str) -> Result<Self, regex::Error> {
        let escaped: Vec<String> = glob.split('*').map(regex::escape).collect();
        Self::new(&format!("^{}$", escaped.join(".*")))
    }

    pub fn is_match(&self, slug: &str) -> bool {
        self.0.is_match(slug)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for SlugPattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for SlugPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SlugPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        SlugPattern::new(&source).map_err(serde::de::Error::custom)
    }
}

/// Requires/provides compatibility between a requirer and a provider
///
/// Holds when every requirement of the requirer (only those concerning
/// `capability_type`, if set) is satisfied by the provider's capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relation {
    capability_type: Option<String>,
}

impl Relation {
    /// Relation over all requirements
    pub fn all() -> Self {
        Self::default()
    }

    /// Relation restricted to one capability type
    pub fn on(capability_type: impl Into<String>) -> Self {
        Self {
            capability_type: Some(capability_type.into()),
        }
    }

    pub fn capability_type(&self) -> Option<&str> {
        self.capability_type.as_deref()
    }

    pub fn holds(&self, requirer: &Contract, provider: &Contract) -> bool {
        self.holds_with(requirer.requires(), &provider.capabilities())
    }

    /// Same check against precomputed capabilities
    pub fn holds_with(&self, requirements: &[Requirement], capabilities: &[Capability]) -> bool {
        requirements
            .iter()
            .filter(|r| match &self.capability_type {
                Some(t) => r.concerns(t),
                None => true,
            })
            .all(|r| r.is_satisfied_by(capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raspberrypi3() -> Contract {
        Contract::new("hw.device-type", "raspberrypi3")
            .with_attribute("data", json!({ "private": false }))
            .with_requirement(Requirement::One(Capability::new("arch.sw", "armv7hf")))
    }

    fn balena_os(arch: &str) -> Contract {
        let mut os = Contract::new("sw.os", "balenaos").with_version("2.100.0");
        os.add_child(Contract::new("arch.sw", arch)).unwrap();
        os
    }

    #[test]
    fn simple_predicates() {
        let os = balena_os("armv7hf");
        assert!(Matcher::Type("sw.os".into()).matches(&os));
        assert!(Matcher::create("sw.os", "balenaos").matches(&os));
        assert!(!Matcher::create("sw.os", "alpine").matches(&os));
        assert!(Matcher::Version("2.100.0".into()).matches(&os));
        assert!(Matcher::Any.matches(&os));
    }

    #[test]
    fn attribute_predicates() {
        let device = raspberrypi3();
        let private = Matcher::Attribute {
            path: "data.private".into(),
            equals: json!(false),
        };
        assert!(private.matches(&device));
        assert!(Matcher::HasAttribute("data".into()).matches(&device));
        assert!(!Matcher::HasAttribute("data.arch".into()).matches(&device));
    }

    #[test]
    fn logical_composition() {
        let os = balena_os("armv7hf");
        let either = Matcher::Slug("alpine".into()).or(Matcher::Slug("balenaos".into()));
        assert!(either.matches(&os));

        let both = Matcher::Type("sw.os".into()).and(Matcher::Slug("alpine".into()));
        assert!(!both.matches(&os));
        assert!(both.negate().matches(&os));
    }

    #[test]
    fn slug_pattern_and_glob() {
        let os = balena_os("armv7hf");
        assert!(Matcher::SlugPattern(SlugPattern::new("^balena").unwrap()).matches(&os));
        assert!(SlugPattern::from_glob("resin*").unwrap().is_match("resinos"));
        assert!(!SlugPattern::from_glob("resin*").unwrap().is_match("balenaos"));
        assert!(SlugPattern::from_glob("a.b").unwrap().is_match("a.b"));
        assert!(!SlugPattern::from_glob("a.b").unwrap().is_match("axb"));
    }

    #[test]
    fn relational_predicates() {
        let os = balena_os("armv7hf");
        assert!(Matcher::Provides(Capability::new("arch.sw", "armv7hf")).matches(&os));
        assert!(Matcher::Requires(Capability::new("arch.sw", "armv7hf")).matches(&raspberrypi3()));
    }

    #[test]
    fn relation_checks_requires_against_provides() {
        let device = raspberrypi3();
        assert!(Relation::all().holds(&device, &balena_os("armv7hf")));
        assert!(!Relation::all().holds(&device, &balena_os("aarch64")));
    }

    #[test]
    fn provider_identity_satisfies_requirement() {
        let device = Contract::new("hw.device-type", "raspberrypi3")
            .with_requirement(Requirement::One(Capability::new("sw.os", "balenaos")));
        let os = Contract::new("sw.os", "balenaos").with_version("2.100.0");
        assert!(Relation::all().holds(&device, &os));
        assert!(!Relation::all().holds(&device, &Contract::new("sw.os", "alpine")));

        let versioned = Contract::new("hw.device-type", "raspberrypi3").with_requirement(Requirement::One(
            Capability::new("sw.os", "balenaos").with_version("2.100.0"),
        ));
        assert!(Relation::all().holds(&versioned, &os));
        assert!(!Relation::all().holds(&versioned, &Contract::new("sw.os", "balenaos").with_version("2.99.0")));

        let renamed = Contract::new("sw.os", "balenaos").with_attribute("aliases", json!(["resinos"]));
        assert!(Matcher::Provides(Capability::new("sw.os", "resinos")).matches(&renamed));
    }

    #[test]
    fn relation_restricted_to_capability_type() {
        let device = raspberrypi3()
            .with_requirement(Requirement::One(Capability::new("hw.bootloader", "uboot")));
        let os = balena_os("armv7hf");

        assert!(!Relation::all().holds(&device, &os));
        assert!(Relation::on("arch.sw").holds(&device, &os));
    }

    #[test]
    fn matcher_from_yaml_shape() {
        let matcher: Matcher = serde_json::from_value(json!({
            "all": [
                { "type": "sw.os" },
                { "not": { "slug": "alpine" } },
                { "attribute": { "path": "data.flavor", "equals": "prod" } }
            ]
        }))
        .unwrap();

        let os = Contract::new("sw.os", "balenaos").with_attribute("data", json!({ "flavor": "prod" }));
        assert!(matcher.matches(&os));

        let any: Matcher = serde_json::from_value(json!("any")).unwrap();
        assert_eq!(any, Matcher::Any);
    }
}
