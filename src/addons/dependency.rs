//! Dependency resolution for addon start order.
//!
//! # Responsibilities
//! - Check every declared dependency refers to a registered addon
//! - Produce a topological order (dependencies first)
//! - Report a concrete cycle path when no order exists
//!
//! Ties between addons that are ready at the same step are broken by
//! registration order, so the same registrations always start the same way.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{AddonError, AddonId};

/// One vertex of the dependency graph.
#[derive(Debug, Clone, Copy)]
pub struct DependencyNode<'a> {
    pub id: &'a AddonId,
    pub dependencies: &'a [AddonId],
}

impl<'a> DependencyNode<'a> {
    pub fn new(id: &'a AddonId, dependencies: &'a [AddonId]) -> Self {
        Self { id, dependencies }
    }
}

/// Return node indices in a valid start order.
pub fn resolve_order(nodes: &[DependencyNode<'_>]) -> Result<Vec<usize>, AddonError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(AddonError::DuplicateId(node.id.clone()));
        }
    }

    // dependencies[i]: distinct predecessors of i; dependents[j]: nodes waiting on j
    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let mut seen = HashSet::new();
        for dependency in node.dependencies {
            let j = *index.get(dependency.as_str()).ok_or_else(|| {
                AddonError::UnresolvedDependency {
                    addon: node.id.clone(),
                    dependency: dependency.clone(),
                }
            })?;
            if seen.insert(j) {
                dependencies[i].push(j);
                dependents[j].push(i);
            }
        }
    }

    let mut pending: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &dependent in &dependents[i] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let cycle = find_cycle(&dependencies, &pending)
            .into_iter()
            .map(|i| nodes[i].id.clone())
            .collect();
        return Err(AddonError::CyclicDependency(cycle));
    }

    Ok(order)
}

/// Walk unresolved dependencies from the first blocked node until a node repeats.
///
/// Every blocked node has at least one blocked dependency, so the walk
/// always closes a loop.
fn find_cycle(dependencies: &[Vec<usize>], pending: &[usize]) -> Vec<usize> {
    let blocked = |i: usize| pending[i] > 0;
    let Some(start) = (0..pending.len()).find(|&i| blocked(i)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let Some(&next) = dependencies[current].iter().find(|&&j| blocked(j)) else {
            return path;
        };
        if let Some(&at) = position.get(&next) {
            let mut cycle = path.split_off(at);
            cycle.push(next);
            return cycle;
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AddonId> {
        names.iter().map(|n| AddonId::from(*n)).collect()
    }

    /// `graph` entries are `(id, "dep1,dep2")`.
    fn resolve(graph: &[(&str, &str)]) -> Result<Vec<String>, AddonError> {
        let owned: Vec<(AddonId, Vec<AddonId>)> = graph
            .iter()
            .map(|(id, deps)| {
                let deps = deps.split(',').filter(|d| !d.is_empty()).map(AddonId::from).collect();
                (AddonId::from(*id), deps)
            })
            .collect();
        let nodes: Vec<DependencyNode<'_>> = owned
            .iter()
            .map(|(id, deps)| DependencyNode::new(id, deps))
            .collect();
        let order = resolve_order(&nodes)?;
        Ok(order.into_iter().map(|i| owned[i].0.to_string()).collect())
    }

    #[test]
    fn dependencies_come_first() {
        let order = resolve(&[
            ("endpoints", "tcp_server,computer"),
            ("computer", "tcp_server"),
            ("tcp_server", ""),
        ])
        .unwrap();
        assert_eq!(order, vec!["tcp_server", "computer", "endpoints"]);
    }

    #[test]
    fn ties_follow_registration_order() {
        let order = resolve(&[("c", ""), ("a", ""), ("b", "c")]).unwrap();
        assert_eq!(order, vec!["c", "a", "b"]);
    }

    #[test]
    fn repeated_dependency_counts_once() {
        let order = resolve(&[("a", "b,b"), ("b", "")]).unwrap();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn unresolved_dependency_names_both_ends() {
        let err = resolve(&[("endpoints", "tcp_server")]).unwrap_err();
        match err {
            AddonError::UnresolvedDependency { addon, dependency } => {
                assert_eq!(addon.as_str(), "endpoints");
                assert_eq!(dependency.as_str(), "tcp_server");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn two_node_cycle() {
        let err = resolve(&[("a", "b"), ("b", "a")]).unwrap_err();
        match err {
            AddonError::CyclicDependency(cycle) => {
                assert_eq!(cycle, ids(&["a", "b", "a"]));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = resolve(&[("a", "a")]).unwrap_err();
        assert!(matches!(err, AddonError::CyclicDependency(c) if c == ids(&["a", "a"])));
    }

    #[test]
    fn cycle_behind_a_chain_reports_only_the_loop() {
        let err = resolve(&[("head", "x"), ("x", "y"), ("y", "x"), ("free", "")]).unwrap_err();
        match err {
            AddonError::CyclicDependency(cycle) => assert_eq!(cycle, ids(&["x", "y", "x"])),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = resolve(&[("a", ""), ("a", "")]).unwrap_err();
        assert!(matches!(err, AddonError::DuplicateId(_)));
    }

    #[test]
    fn empty_graph() {
        assert!(resolve(&[]).unwrap().is_empty());
    }
}
