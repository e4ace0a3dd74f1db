//! Dependency graph construction and validation.
//!
//! A [`DependencyGraph`] can only be obtained through
//! [`DependencyGraph::build`], so holding one means the release list had
//! unique names, resolvable dependencies and no cycles.

use std::collections::HashMap;
use tracing::debug;

use crate::config::ReleaseConfig;
use crate::error::GraphError;

/// Anything that can be placed in the dependency graph.
pub trait ReleaseNode {
    /// Raw (unexpanded) release name.
    fn name(&self) -> &str;

    /// Names of releases that must be deployed first.
    fn depends_on(&self) -> &[String];
}

impl ReleaseNode for ReleaseConfig {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Validated, immutable dependency graph over a release list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Release names in input order.
    names: Vec<String>,
    /// Input index of each name.
    index: HashMap<String, usize>,
    /// Dependencies of each release as input indices, in declared order.
    dependencies: Vec<Vec<usize>>,
    /// Whether any release declares a dependency.
    has_dependencies: bool,
}

impl DependencyGraph {
    /// Builds and validates the graph for `releases`.
    ///
    /// Checks run in order: duplicate names, unknown dependencies, cycles.
    /// Only the first violation is reported.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateReleaseName`],
    /// [`GraphError::UnknownDependency`] or [`GraphError::DependencyCycle`].
    pub fn build<R: ReleaseNode>(releases: &[R]) -> Result<Self, GraphError> {
        let mut names = Vec::with_capacity(releases.len());
        let mut index = HashMap::with_capacity(releases.len());

        for (i, release) in releases.iter().enumerate() {
            let name = release.name();
            if index.insert(name.to_string(), i).is_some() {
                return Err(GraphError::DuplicateReleaseName {
                    name: name.to_string(),
                });
            }
            names.push(name.to_string());
        }

        let mut dependencies = Vec::with_capacity(releases.len());
        let mut has_dependencies = false;

        for release in releases {
            let mut deps: Vec<usize> = Vec::with_capacity(release.depends_on().len());
            for dep in release.depends_on() {
                let Some(&dep_idx) = index.get(dep.as_str()) else {
                    return Err(GraphError::UnknownDependency {
                        release: release.name().to_string(),
                        dependency: dep.clone(),
                    });
                };
                // repeated entries in one list collapse to a single edge
                if !deps.contains(&dep_idx) {
                    deps.push(dep_idx);
                }
            }
            has_dependencies |= !deps.is_empty();
            dependencies.push(deps);
        }

        let graph = Self {
            names,
            index,
            dependencies,
            has_dependencies,
        };
        graph.check_acyclic()?;

        debug!(
            "Built dependency graph with {} releases (dependencies: {})",
            graph.len(),
            graph.has_dependencies
        );
        Ok(graph)
    }

    /// Depth-first cycle check over every release in input order.
    ///
    /// Uses an explicit stack of `(node, next dependency position)` frames
    /// so arbitrarily long chains do not exhaust the thread stack.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut visited = vec![false; self.names.len()];
        let mut in_progress = vec![false; self.names.len()];
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.names.len() {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            in_progress[root] = true;
            stack.push((root, 0));

            while let Some(top) = stack.last_mut() {
                let (node, pos) = *top;
                if let Some(&dep) = self.dependencies[node].get(pos) {
                    top.1 += 1;
                    if in_progress[dep] {
                        return Err(GraphError::DependencyCycle {
                            node: self.names[node].clone(),
                        });
                    }
                    if !visited[dep] {
                        visited[dep] = true;
                        in_progress[dep] = true;
                        stack.push((dep, 0));
                    }
                } else {
                    in_progress[node] = false;
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// Returns the number of releases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the graph has no releases.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns true if at least one release declares a dependency.
    #[must_use]
    pub const fn has_dependencies(&self) -> bool {
        self.has_dependencies
    }

    /// Returns release names in input order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the input position of a release.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Returns the de-duplicated dependencies of a release, in declared order.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.position(name)?;
        Some(
            self.dependencies[idx]
                .iter()
                .map(|&d| self.names[d].as_str())
                .collect(),
        )
    }

    /// Dependencies of the release at `idx` as input indices.
    pub(super) fn dependency_indices(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn releases(spec: &[(&str, &[&str])]) -> Vec<ReleaseConfig> {
        spec.iter()
            .map(|(name, deps)| ReleaseConfig::new(*name, deps))
            .collect()
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::build::<ReleaseConfig>(&[]).expect("empty graph");
        assert!(graph.is_empty());
        assert!(!graph.has_dependencies());
    }

    #[test]
    fn test_no_dependencies_flag() {
        let graph = DependencyGraph::build(&releases(&[("a", &[]), ("b", &[])])).unwrap();
        assert!(!graph.has_dependencies());
        assert_eq!(graph.names(), ["a", "b"]);
    }

    #[test]
    fn test_duplicate_name() {
        let err = DependencyGraph::build(&releases(&[("a", &[]), ("a", &[])])).unwrap_err();
        assert_eq!(err.to_string(), "duplicate release name a");
    }

    #[test]
    fn test_duplicate_checked_before_unknown() {
        let err = DependencyGraph::build(&releases(&[("a", &["zeta"]), ("a", &[])])).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateReleaseName { .. }));
    }

    #[test]
    fn test_unknown_dependency() {
        let err = DependencyGraph::build(&releases(&[("a", &["zeta"])])).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                release: String::from("a"),
                dependency: String::from("zeta"),
            }
        );
        let msg = err.to_string();
        assert!(msg.contains("a") && msg.contains("zeta"));
    }

    #[test]
    fn test_two_node_cycle() {
        let err = DependencyGraph::build(&releases(&[("a", &["b"]), ("b", &["a"])])).unwrap_err();
        assert!(err.to_string().contains("cycle detected"));
        // b's edge back to a closes the cycle
        assert_eq!(err, GraphError::DependencyCycle { node: String::from("b") });
    }

    #[test]
    fn test_longer_cycle_behind_acyclic_prefix() {
        let err = DependencyGraph::build(&releases(&[
            ("root", &[]),
            ("a", &["b"]),
            ("b", &["c"]),
            ("c", &["a", "root"]),
        ]))
        .unwrap_err();
        assert_eq!(err, GraphError::DependencyCycle { node: String::from("c") });
    }

    #[test]
    fn test_duplicate_dependency_entries_tolerated() {
        let graph = DependencyGraph::build(&releases(&[("a", &["b", "b"]), ("b", &[])])).unwrap();
        assert_eq!(graph.dependencies_of("a"), Some(vec!["b"]));
        assert!(graph.has_dependencies());
    }

    #[test]
    fn test_templated_names_resolve_raw() {
        let graph = DependencyGraph::build(&releases(&[
            ("{{.PREFIX}}-api", &["{{.PREFIX}}-db"]),
            ("{{.PREFIX}}-db", &[]),
        ]))
        .unwrap();
        assert_eq!(graph.position("{{.PREFIX}}-db"), Some(1));
    }

    fn chain(len: usize) -> Vec<ReleaseConfig> {
        (0..len)
            .map(|i| {
                let deps: Vec<String> = if i + 1 < len { vec![format!("r{}", i + 1)] } else { vec![] };
                let mut r = ReleaseConfig::new(format!("r{i}"), &[]);
                r.depends_on = deps;
                r
            })
            .collect()
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let graph = DependencyGraph::build(&chain(200_000)).expect("acyclic");
        assert_eq!(graph.len(), 200_000);
    }

    #[test]
    fn test_long_cycle_detected() {
        let mut releases = chain(200_000);
        releases[199_999].depends_on = vec![String::from("r0")];

        let err = DependencyGraph::build(&releases).unwrap_err();
        assert_eq!(err, GraphError::DependencyCycle { node: String::from("r199999") });
    }
}
