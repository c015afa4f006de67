//! The universe: synthetic root owning the merged contract graph
//!
//! Merging is a fallible union: a second contract with an existing
//! (type, slug, version) is a conflict, never an overwrite.

use std::collections::BTreeMap;

use crate::contract::{Contract, ContractKey, ContractPath};
use crate::matcher::Matcher;

/// Reserved meta-type of the root node
pub const UNIVERSE_TYPE: &str = "meta.universe";

/// Graph integrity errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate contract {key}: declared in {first} and {second}")]
    DuplicateContract {
        key: ContractKey,
        first: String,
        second: String,
    },
}

/// Root aggregate over every loaded contract
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    root: Contract,
}

impl Universe {
    pub fn new() -> Self {
        Self {
            root: Contract::new(UNIVERSE_TYPE, "universe"),
        }
    }

    /// Merge a batch of top-level contracts.
    ///
    /// Every key is checked against existing children and the rest of the
    /// batch before anything is inserted, so a conflict leaves the universe
    /// untouched.
    pub fn add_children(&mut self, contracts: Vec<Contract>) -> Result<(), GraphError> {
        let mut incoming: BTreeMap<&ContractKey, &Contract> = BTreeMap::new();
        for contract in &contracts {
            if let Some(existing) = self.root.child(contract.key()) {
                return Err(duplicate(existing, contract));
            }
            if let Some(previous) = incoming.insert(contract.key(), contract) {
                return Err(duplicate(previous, contract));
            }
        }

        let count = contracts.len();
        for contract in contracts {
            self.root.insert_child_unchecked(contract, ContractPath::root());
        }
        tracing::debug!(count, total = self.len(), "merged contracts into universe");
        Ok(())
    }

    /// Every descendant satisfying the matcher, at any depth, in
    /// depth-first pre-order
    pub fn find_children(&self, matcher: &Matcher) -> Vec<&Contract> {
        self.root
            .descendants()
            .into_iter()
            .filter(|c| matcher.matches(c))
            .collect()
    }

    /// Detach a node and its whole subtree, returning it detached
    pub fn remove_child(&mut self, path: &ContractPath) -> Option<Contract> {
        let key = path.last()?;
        let parent_path = path.parent()?;
        let parent = self.get_mut(&parent_path)?;
        let removed = parent.take_child(key)?;
        tracing::debug!(contract = %path, "removed contract subtree");
        Some(removed.detached())
    }

    /// Remove every contract matching any of the matchers, exactly the way a
    /// denylist is applied before queries run. Returns the removed subtrees.
    pub fn apply_denylist(&mut self, matchers: &[Matcher]) -> Vec<Contract> {
        let mut targets: Vec<ContractPath> = Vec::new();
        for matcher in matchers {
            for contract in self.find_children(matcher) {
                targets.push(contract.path());
            }
        }
        targets.sort();
        targets.dedup();

        // Ancestors sort first; descendants removed with them yield nothing
        targets
            .iter()
            .filter_map(|path| self.remove_child(path))
            .collect()
    }

    pub fn get(&self, path: &ContractPath) -> Option<&Contract> {
        let mut current = &self.root;
        for key in path.keys() {
            current = current.child(key)?;
        }
        Some(current)
    }

    fn get_mut(&mut self, path: &ContractPath) -> Option<&mut Contract> {
        let mut current = &mut self.root;
        for key in path.keys() {
            current = current.child_mut(key)?;
        }
        Some(current)
    }

    /// Follow a contract's parent link; `None` for top-level and detached
    /// contracts
    pub fn parent_of(&self, contract: &Contract) -> Option<&Contract> {
        let parent = contract.parent()?;
        if parent.is_root() {
            return None;
        }
        self.get(parent)
    }

    /// Top-level contracts in key order
    pub fn children(&self) -> impl Iterator<Item = &Contract> {
        self.root.children()
    }

    /// All contracts in depth-first pre-order
    pub fn contracts(&self) -> Vec<&Contract> {
        self.root.descendants()
    }

    pub fn len(&self) -> usize {
        self.root.descendants().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.root.has_children()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

fn duplicate(first: &Contract, second: &Contract) -> GraphError {
    GraphError::DuplicateContract {
        key: second.key().clone(),
        first: first.source_label(),
        second: second.source_label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{Capability, Requirement};
    use pretty_assertions::assert_eq;

    fn sample() -> Universe {
        let mut balena = Contract::new("sw.os", "balenaos").with_version("2.100.0");
        balena.add_child(Contract::new("arch.sw", "armv7hf")).unwrap();

        let mut alpine = Contract::new("sw.os", "alpine");
        alpine.add_child(Contract::new("arch.sw", "armv7hf")).unwrap();

        let device = Contract::new("hw.device-type", "raspberrypi3")
            .with_requirement(Requirement::One(Capability::new("arch.sw", "armv7hf")));

        let mut universe = Universe::new();
        universe.add_children(vec![balena, alpine, device]).unwrap();
        universe
    }

    fn slugs(contracts: &[&Contract]) -> Vec<String> {
        contracts.iter().map(|c| c.key().to_string()).collect()
    }

    #[test]
    fn traversal_is_deterministic_preorder() {
        let universe = sample();
        assert_eq!(
            slugs(&universe.contracts()),
            vec![
                "hw.device-type/raspberrypi3",
                "sw.os/alpine",
                "arch.sw/armv7hf",
                "sw.os/balenaos@2.100.0",
                "arch.sw/armv7hf",
            ]
        );
    }

    #[test]
    fn find_children_ignores_depth() {
        let universe = sample();
        let arches = universe.find_children(&Matcher::Type("arch.sw".into()));
        assert_eq!(arches.len(), 2);
        assert!(arches.iter().all(|c| c.path().depth() == 2));
    }

    #[test]
    fn duplicate_merge_leaves_universe_untouched() {
        let mut universe = sample();
        let before = universe.clone();

        let err = universe
            .add_children(vec![
                Contract::new("sw.os", "ubuntu"),
                Contract::new("sw.os", "balenaos").with_version("2.100.0"),
            ])
            .unwrap_err();

        assert!(matches!(err, GraphError::DuplicateContract { .. }));
        assert_eq!(universe, before);
    }

    #[test]
    fn duplicate_within_batch_is_rejected() {
        let mut universe = Universe::new();
        let err = universe
            .add_children(vec![Contract::new("sw.os", "a"), Contract::new("sw.os", "a")])
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateContract { .. }));
        assert!(universe.is_empty());
    }

    #[test]
    fn remove_child_drops_whole_subtree() {
        let mut universe = sample();
        let alpine_path = ContractPath::root().child(ContractKey::new("sw.os", "alpine"));

        let removed = universe.remove_child(&alpine_path).unwrap();
        assert_eq!(removed.slug(), "alpine");
        assert!(removed.parent().is_none());

        assert!(universe.get(&alpine_path).is_none());
        assert_eq!(universe.find_children(&Matcher::Type("arch.sw".into())).len(), 1);
        assert_eq!(universe.len(), 3);
    }

    #[test]
    fn denylist_removes_matches_and_descendants() {
        let mut universe = sample();
        let removed = universe.apply_denylist(&[
            Matcher::create("sw.os", "alpine"),
            Matcher::create("sw.os", "fedora"),
        ]);

        assert_eq!(removed.len(), 1);
        assert!(universe.find_children(&Matcher::Slug("alpine".into())).is_empty());
        for contract in universe.contracts() {
            assert!(contract
                .parent()
                .map(|p| !p.keys().iter().any(|k| k.slug == "alpine"))
                .unwrap_or(true));
        }
    }

    #[test]
    fn denylist_with_nested_matches_removes_ancestor_once() {
        let mut universe = sample();
        let removed = universe.apply_denylist(&[
            Matcher::create("sw.os", "alpine"),
            Matcher::Type("arch.sw".into()),
        ]);

        // alpine subtree, plus balenaos' own arch child
        assert_eq!(removed.len(), 2);
        assert!(universe.find_children(&Matcher::Type("arch.sw".into())).is_empty());
    }

    #[test]
    fn parent_lookup_is_non_owning() {
        let universe = sample();
        let arch = universe
            .find_children(&Matcher::Type("arch.sw".into()))
            .into_iter()
            .last()
            .unwrap();
        let parent = universe.parent_of(arch).unwrap();
        assert_eq!(parent.slug(), "balenaos");

        let top = universe.children().next().unwrap();
        assert!(universe.parent_of(top).is_none());
    }
}
