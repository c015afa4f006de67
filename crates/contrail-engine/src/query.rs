//! Selector resolution
//!
//! Candidates are collected per role, then combined depth-first in role
//! declaration order. Each constraint is checked as soon as both of its roles
//! are bound, so failing branches are pruned without building the full
//! product. A contract never fills two roles of the same context.

use contrail_core::{Capability, Contract, Relation, Universe};
use contrail_template::{RenderError, TemplateRenderer};
use std::collections::BTreeMap;

use crate::blueprint::{OutputDescriptor, Selector};
use crate::context::{bindings_context, describe_bindings, Context};

/// A combination dropped because a derived field failed to render
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedContext {
    /// Role bindings, as in [`Context::describe`]
    pub bindings: String,

    /// Derived field that failed (`path` or a field name)
    pub field: String,

    pub error: RenderError,
}

/// Outcome of one selector over the universe
#[derive(Debug, Clone, Default)]
pub struct QueryResult<'u> {
    pub contexts: Vec<Context<'u>>,

    pub skipped: Vec<SkippedContext>,

    /// Candidate count per role, in selector order
    pub candidates: Vec<(String, usize)>,
}

impl<'u> QueryResult<'u> {
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

struct Candidate<'u> {
    contract: &'u Contract,
    capabilities: Vec<Capability>,
}

/// Constraint resolved to role indices
struct Check {
    requirer: usize,
    provider: usize,
    relation: Relation,
}

/// Executes selectors against a filtered universe
pub struct QueryEngine<'u> {
    universe: &'u Universe,
    renderer: &'u TemplateRenderer,
}

impl<'u> QueryEngine<'u> {
    pub fn new(universe: &'u Universe, renderer: &'u TemplateRenderer) -> Self {
        Self { universe, renderer }
    }

    /// Every binding satisfying the selector, in deterministic order
    pub fn combinations(&self, selector: &Selector) -> Vec<Vec<&'u Contract>> {
        let candidates: Vec<Vec<Candidate<'u>>> = selector
            .roles
            .iter()
            .map(|role| {
                self.universe
                    .find_children(&role.matcher)
                    .into_iter()
                    .map(|contract| Candidate {
                        contract,
                        capabilities: contract.capabilities(),
                    })
                    .collect()
            })
            .collect();

        // Checks grouped by the later of their two roles
        let mut checks: Vec<Vec<Check>> = (0..selector.roles.len()).map(|_| Vec::new()).collect();
        for constraint in &selector.constraints {
            let (Some(requirer), Some(provider)) = (
                selector.role_index(&constraint.requires),
                selector.role_index(&constraint.provided_by),
            ) else {
                continue;
            };
            checks[requirer.max(provider)].push(Check {
                requirer,
                provider,
                relation: constraint.relation(),
            });
        }

        let mut chosen = Vec::with_capacity(candidates.len());
        let mut out = Vec::new();
        search(&candidates, &checks, &mut chosen, &mut out);

        out.into_iter()
            .map(|indices| {
                indices
                    .iter()
                    .enumerate()
                    .map(|(role, &i)| candidates[role][i].contract)
                    .collect()
            })
            .collect()
    }

    /// Resolve the selector and render each combination's derived fields
    pub fn execute(&self, selector: &Selector, output: &OutputDescriptor) -> QueryResult<'u> {
        let mut result = QueryResult {
            candidates: selector
                .roles
                .iter()
                .map(|role| (role.name.clone(), self.universe.find_children(&role.matcher).len()))
                .collect(),
            ..QueryResult::default()
        };

        for combination in self.combinations(selector) {
            let bindings: Vec<(String, &'u Contract)> = selector
                .roles
                .iter()
                .map(|role| role.name.clone())
                .zip(combination)
                .collect();

            match self.derive(&bindings, output) {
                Ok((fields, path)) => result.contexts.push(Context::new(bindings, fields, path)),
                Err((field, error)) => {
                    let skipped = SkippedContext {
                        bindings: describe_bindings(&bindings),
                        field,
                        error,
                    };
                    tracing::warn!(
                        bindings = %skipped.bindings,
                        field = %skipped.field,
                        error = %skipped.error,
                        "skipping combination"
                    );
                    result.skipped.push(skipped);
                }
            }
        }

        tracing::debug!(
            contexts = result.contexts.len(),
            skipped = result.skipped.len(),
            "query resolved"
        );
        result
    }

    /// Fields see only the roles; `path` also sees the fields
    fn derive(
        &self,
        bindings: &[(String, &'u Contract)],
        output: &OutputDescriptor,
    ) -> Result<(BTreeMap<String, String>, String), (String, RenderError)> {
        let roles = bindings_context(bindings);
        let mut ctx = roles.clone();

        let mut fields = BTreeMap::new();
        for (name, template) in &output.fields {
            let value = self
                .renderer
                .render(template, &roles)
                .map_err(|e| (name.clone(), e))?;
            ctx.insert(name.clone(), serde_json::Value::String(value.clone()));
            fields.insert(name.clone(), value);
        }

        let path = match &output.path {
            Some(template) => self
                .renderer
                .render(template, &ctx)
                .map_err(|e| ("path".to_string(), e))?,
            None => bindings
                .iter()
                .map(|(_, contract)| contract.slug())
                .collect::<Vec<_>>()
                .join("/"),
        };

        Ok((fields, path))
    }
}

fn search(
    candidates: &[Vec<Candidate<'_>>],
    checks: &[Vec<Check>],
    chosen: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    let depth = chosen.len();
    if depth == candidates.len() {
        out.push(chosen.clone());
        return;
    }

    for (index, candidate) in candidates[depth].iter().enumerate() {
        let reused = chosen
            .iter()
            .enumerate()
            .any(|(role, &i)| std::ptr::eq(candidates[role][i].contract, candidate.contract));
        if reused {
            continue;
        }

        chosen.push(index);
        let satisfied = checks[depth].iter().all(|check| {
            let requirer = &candidates[check.requirer][chosen[check.requirer]];
            let provider = &candidates[check.provider][chosen[check.provider]];
            check
                .relation
                .holds_with(requirer.contract.requires(), &provider.capabilities)
        });
        if satisfied {
            search(candidates, checks, chosen, out);
        }
        chosen.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{Constraint, Role, TemplateSource};
    use contrail_core::{Matcher, Requirement};
    use pretty_assertions::assert_eq;

    fn universe() -> Universe {
        let mut balena = Contract::new("sw.os", "balenaos").with_version("2.100.0");
        balena.add_child(Contract::new("arch.sw", "armv7hf")).unwrap();
        let mut balena64 = Contract::new("sw.os", "balenaos-64").with_version("2.100.0");
        balena64.add_child(Contract::new("arch.sw", "aarch64")).unwrap();

        let rpi3 = Contract::new("hw.device-type", "raspberrypi3")
            .with_requirement(Requirement::One(Capability::new("arch.sw", "armv7hf")));
        let rpi4 = Contract::new("hw.device-type", "raspberrypi4-64")
            .with_requirement(Requirement::AnyOf {
                or: vec![Capability::new("arch.sw", "aarch64"), Capability::new("arch.sw", "arm64")],
            });

        let mut universe = Universe::new();
        universe.add_children(vec![balena, balena64, rpi3, rpi4]).unwrap();
        universe
    }

    fn selector() -> Selector {
        Selector {
            roles: vec![
                Role {
                    name: "os".into(),
                    matcher: Matcher::Type("sw.os".into()),
                },
                Role {
                    name: "device".into(),
                    matcher: Matcher::Type("hw.device-type".into()),
                },
            ],
            constraints: vec![Constraint {
                requires: "device".into(),
                provided_by: "os".into(),
                capability: Some("arch.sw".into()),
            }],
        }
    }

    fn output() -> OutputDescriptor {
        let mut fields = BTreeMap::new();
        fields.insert("imageName".to_string(), "{{ os.slug }}-{{ device.slug }}".to_string());
        OutputDescriptor {
            filename: "contract.json".into(),
            path: Some("{{ device.slug }}/{{ imageName }}".into()),
            fields,
            template: TemplateSource::Inline("{}".into()),
        }
    }

    #[test]
    fn constraints_join_compatible_pairs() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let result = QueryEngine::new(&universe, &renderer).execute(&selector(), &output());

        let labels: Vec<&str> = result.contexts.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["balenaos-raspberrypi3", "balenaos-64-raspberrypi4-64"]);
        assert_eq!(result.contexts[0].path(), "raspberrypi3/balenaos-raspberrypi3");
        assert_eq!(result.candidates, vec![("os".to_string(), 2), ("device".to_string(), 2)]);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn every_context_satisfies_constraints() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let selector = selector();
        let result = QueryEngine::new(&universe, &renderer).execute(&selector, &output());

        for context in &result.contexts {
            for constraint in &selector.constraints {
                let requirer = context.get(&constraint.requires).unwrap();
                let provider = context.get(&constraint.provided_by).unwrap();
                assert!(constraint.relation().holds(requirer, provider));
            }
        }
    }

    #[test]
    fn unconstrained_product_skips_self_pairs() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let selector = Selector {
            roles: vec![
                Role { name: "a".into(), matcher: Matcher::Type("sw.os".into()) },
                Role { name: "b".into(), matcher: Matcher::Type("sw.os".into()) },
            ],
            constraints: vec![],
        };

        let combinations = QueryEngine::new(&universe, &renderer).combinations(&selector);
        assert_eq!(combinations.len(), 2);
        for pair in combinations {
            assert!(!std::ptr::eq(pair[0], pair[1]));
        }
    }

    #[test]
    fn zero_candidates_is_empty_not_error() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let mut selector = selector();
        selector.roles[0].matcher = Matcher::create("sw.os", "alpine");

        let result = QueryEngine::new(&universe, &renderer).execute(&selector, &output());
        assert!(result.is_empty());
        assert_eq!(result.candidates[0], ("os".to_string(), 0));
    }

    #[test]
    fn failing_field_skips_only_that_combination() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let mut output = output();
        output
            .fields
            .insert("kernel".into(), "{% if os.slug == 'balenaos' %}{{ os.data.kernel }}{% endif %}".into());

        let result = QueryEngine::new(&universe, &renderer).execute(&selector(), &output);
        let labels: Vec<&str> = result.contexts.iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["balenaos-64-raspberrypi4-64"]);
        assert_eq!(result.contexts[0].field("kernel"), Some(""));
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].field, "kernel");
        assert_eq!(
            result.skipped[0].error,
            RenderError::UnresolvedReference {
                reference: "os.data.kernel".into()
            }
        );
    }

    #[test]
    fn default_path_joins_slugs() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let mut output = output();
        output.path = None;

        let result = QueryEngine::new(&universe, &renderer).execute(&selector(), &output);
        assert_eq!(result.contexts[0].path(), "balenaos/raspberrypi3");
    }

    #[test]
    fn identical_inputs_identical_sequence() {
        let universe = universe();
        let renderer = TemplateRenderer::without_files();
        let engine = QueryEngine::new(&universe, &renderer);
        let first: Vec<String> = engine.execute(&selector(), &output()).contexts.iter().map(|c| c.describe()).collect();
        let second: Vec<String> = engine.execute(&selector(), &output()).contexts.iter().map(|c| c.describe()).collect();
        assert_eq!(first, second);
    }
}
