//! Dependency graph over a definition's stacks and the creation order it implies.
//!
//! Ordering is Kahn's algorithm with a LIFO frontier: stacks that do not
//! depend on each other come out in no particular relative order, only the
//! dependency partial order is guaranteed.

use std::collections::{BTreeMap, BTreeSet};

use crate::definition::StackDefinition;
use crate::error::{ForgeError, Result};

/// Stack name -> names of the stacks it depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Union of explicit `requires` and every remote parameter's source stack.
    ///
    /// Fails with `MissingDependency` on the first dependency that is not a
    /// stack of `stacks`.
    pub fn build(stacks: &BTreeMap<String, StackDefinition>) -> Result<Self> {
        let mut edges = BTreeMap::new();
        for (name, stack) in stacks {
            let deps = dependencies_of(stack);
            if let Some(missing) = deps.iter().find(|d| !stacks.contains_key(*d)) {
                return Err(ForgeError::MissingDependency {
                    stack: name.clone(),
                    dependency: missing.clone(),
                });
            }
            edges.insert(name.clone(), deps);
        }
        Ok(Self { edges })
    }

    pub fn dependencies(&self, stack: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(stack)
    }

    /// Topological order, dependencies first.
    pub fn order(&self) -> Result<Vec<String>> {
        let mut pending: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut frontier: Vec<&str> = Vec::new();
        for (name, deps) in &self.edges {
            if deps.is_empty() {
                frontier.push(name);
            } else {
                pending.insert(name, deps.iter().map(String::as_str).collect());
            }
        }

        let mut ordered = Vec::with_capacity(self.edges.len());
        while let Some(done) = frontier.pop() {
            ordered.push(done.to_string());
            let mut freed = Vec::new();
            for (name, deps) in &mut pending {
                if deps.remove(done) && deps.is_empty() {
                    freed.push(*name);
                }
            }
            for name in freed {
                pending.remove(name);
                frontier.push(name);
            }
        }

        if !pending.is_empty() {
            return Err(ForgeError::CircularDependency {
                remaining: pending.keys().map(|s| (*s).to_string()).collect(),
            });
        }
        Ok(ordered)
    }
}

fn dependencies_of(stack: &StackDefinition) -> BTreeSet<String> {
    stack
        .requires
        .iter()
        .cloned()
        .chain(
            stack
                .parameters
                .iter()
                .filter_map(|(_, decl)| decl.reference())
                .map(|r| r.stack.clone()),
        )
        .collect()
}

/// Creation order of `stacks`: every stack after all of its dependencies.
pub fn order_stacks(
    stacks: &BTreeMap<String, StackDefinition>,
) -> Result<Vec<(&str, &StackDefinition)>> {
    let order = DependencyGraph::build(stacks)?.order()?;
    Ok(order
        .into_iter()
        .filter_map(|name| stacks.get_key_value(&name))
        .map(|(name, stack)| (name.as_str(), stack))
        .collect())
}

/// Deletion order: the exact reverse of the creation order.
pub fn deletion_order(
    stacks: &BTreeMap<String, StackDefinition>,
) -> Result<Vec<(&str, &StackDefinition)>> {
    let mut order = order_stacks(stacks)?;
    order.reverse();
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ParameterDeclaration, RemoteReference, SourceKind};

    fn stack(requires: &[&str]) -> StackDefinition {
        StackDefinition {
            requires: requires.iter().map(|s| s.to_string()).collect(),
            ..StackDefinition::default()
        }
    }

    fn stack_with_source(source: &str) -> StackDefinition {
        StackDefinition {
            parameters: [(
                "VPC".to_string(),
                ParameterDeclaration::remote(RemoteReference::new(source, SourceKind::Output)),
            )]
            .into_iter()
            .collect(),
            ..StackDefinition::default()
        }
    }

    fn names(order: &[(&str, &StackDefinition)]) -> Vec<String> {
        order.iter().map(|(n, _)| n.to_string()).collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order
            .iter()
            .position(|n| n == name)
            .unwrap_or_else(|| panic!("{name} missing from {order:?}"))
    }

    #[test]
    fn single_stack() {
        let stacks = BTreeMap::from([("plain".to_string(), stack(&[]))]);
        assert_eq!(names(&order_stacks(&stacks).expect("order")), vec!["plain"]);
    }

    #[test]
    fn explicit_requires_come_first() {
        let stacks = BTreeMap::from([
            ("app".to_string(), stack(&["vpc", "iam"])),
            ("vpc".to_string(), stack(&[])),
            ("iam".to_string(), stack(&[])),
            ("dns".to_string(), stack(&["app"])),
        ]);
        let order = names(&order_stacks(&stacks).expect("order"));
        assert_eq!(order.len(), 4);
        assert!(position(&order, "vpc") < position(&order, "app"));
        assert!(position(&order, "iam") < position(&order, "app"));
        assert!(position(&order, "app") < position(&order, "dns"));
    }

    #[test]
    fn parameter_sources_are_implicit_dependencies() {
        let stacks = BTreeMap::from([
            ("a".to_string(), stack(&[])),
            ("b".to_string(), stack_with_source("a")),
        ]);
        let graph = DependencyGraph::build(&stacks).expect("graph");
        assert!(graph.dependencies("b").expect("b").contains("a"));
        assert_eq!(names(&order_stacks(&stacks).expect("order")), vec!["a", "b"]);
    }

    #[test]
    fn duplicate_dependency_counts_once() {
        let mut b = stack_with_source("a");
        b.requires.push("a".to_string());
        let stacks = BTreeMap::from([("a".to_string(), stack(&[])), ("b".to_string(), b)]);
        let graph = DependencyGraph::build(&stacks).expect("graph");
        assert_eq!(graph.dependencies("b").expect("b").len(), 1);
        assert_eq!(names(&order_stacks(&stacks).expect("order")), vec!["a", "b"]);
    }

    #[test]
    fn missing_dependency_is_reported() {
        let stacks = BTreeMap::from([
            ("a".to_string(), stack(&[])),
            ("b".to_string(), stack(&["nope"])),
        ]);
        match order_stacks(&stacks) {
            Err(ForgeError::MissingDependency { stack, dependency }) => {
                assert_eq!(stack, "b");
                assert_eq!(dependency, "nope");
            }
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[test]
    fn missing_parameter_source_is_reported() {
        let stacks = BTreeMap::from([("b".to_string(), stack_with_source("ghost"))]);
        assert!(matches!(
            order_stacks(&stacks),
            Err(ForgeError::MissingDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn two_cycle_names_exactly_the_cycle() {
        let stacks = BTreeMap::from([
            ("a".to_string(), stack(&["b"])),
            ("b".to_string(), stack(&["a"])),
            ("c".to_string(), stack(&[])),
        ]);
        match order_stacks(&stacks) {
            Err(ForgeError::CircularDependency { remaining }) => {
                assert_eq!(remaining, vec!["a", "b"]);
            }
            other => panic!("expected CircularDependency, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_circular() {
        let stacks = BTreeMap::from([("a".to_string(), stack(&["a"]))]);
        assert!(matches!(
            order_stacks(&stacks),
            Err(ForgeError::CircularDependency { remaining }) if remaining == vec!["a"]
        ));
    }

    #[test]
    fn stacks_behind_a_cycle_remain_unresolved() {
        let stacks = BTreeMap::from([
            ("a".to_string(), stack(&["b"])),
            ("b".to_string(), stack(&["a"])),
            ("c".to_string(), stack(&["a"])),
        ]);
        assert!(matches!(
            order_stacks(&stacks),
            Err(ForgeError::CircularDependency { remaining }) if remaining == vec!["a", "b", "c"]
        ));
    }

    #[test]
    fn deletion_is_reverse_of_creation() {
        let stacks = BTreeMap::from([
            ("a".to_string(), stack(&[])),
            ("b".to_string(), stack(&["a"])),
            ("c".to_string(), stack(&["b"])),
        ]);
        let create = names(&order_stacks(&stacks).expect("order"));
        let mut delete = names(&deletion_order(&stacks).expect("order"));
        delete.reverse();
        assert_eq!(create, delete);
        assert_eq!(create, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_definition_orders_nothing() {
        let stacks = BTreeMap::new();
        assert!(order_stacks(&stacks).expect("order").is_empty());
    }
}
