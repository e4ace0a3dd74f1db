//! Leveled topological grouping of a validated dependency graph.
//!
//! A release's level is the length of the longest dependency chain ending
//! at it. Deploying levels in ascending order therefore deploys every
//! dependency strictly before its dependents.

use serde::Serialize;
use std::collections::BTreeMap;

use super::builder::DependencyGraph;

/// Release names grouped by dependency level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LevelGroups {
    groups: BTreeMap<usize, Vec<String>>,
}

impl LevelGroups {
    /// Computes the level groups of `graph`.
    ///
    /// Order within a level follows a depth-first post-order over the
    /// releases in input order, visiting each release's dependencies sorted
    /// by input position.
    #[must_use]
    pub fn assign(graph: &DependencyGraph) -> Self {
        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();

        if graph.is_empty() {
            return Self { groups };
        }

        if !graph.has_dependencies() {
            groups.insert(0, graph.names().to_vec());
            return Self { groups };
        }

        let order = topological_order(graph);
        let mut levels = vec![0usize; graph.len()];

        for idx in order {
            let level = graph
                .dependency_indices(idx)
                .iter()
                .map(|&dep| levels[dep] + 1)
                .max()
                .unwrap_or(0);
            levels[idx] = level;
            groups
                .entry(level)
                .or_default()
                .push(graph.names()[idx].clone());
        }

        Self { groups }
    }

    /// Returns the number of levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the releases of one level.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<&[String]> {
        self.groups.get(&level).map(Vec::as_slice)
    }

    /// Returns the level a release was assigned to.
    #[must_use]
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.groups
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == name))
            .map(|(level, _)| *level)
    }

    /// Iterates levels in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &[String])> {
        self.groups.iter().map(|(level, names)| (*level, names.as_slice()))
    }

    /// Returns the total number of releases across all levels.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Returns the underlying level map.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<usize, Vec<String>> {
        &self.groups
    }
}

/// Depth-first post-order over releases in input order.
///
/// Dependencies are visited sorted by input position. The walk keeps its
/// own stack of `(node, next dependency position)` frames.
fn topological_order(graph: &DependencyGraph) -> Vec<usize> {
    let sorted: Vec<Vec<usize>> = (0..graph.len())
        .map(|idx| {
            let mut deps = graph.dependency_indices(idx).to_vec();
            deps.sort_unstable();
            deps
        })
        .collect();

    let mut visited = vec![false; graph.len()];
    let mut order = Vec::with_capacity(graph.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..graph.len() {
        if visited[root] {
            continue;
        }
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (node, pos) = *top;
            if let Some(&dep) = sorted[node].get(pos) {
                top.1 += 1;
                if !visited[dep] {
                    stack.push((dep, 0));
                }
            } else {
                stack.pop();
                if !visited[node] {
                    visited[node] = true;
                    order.push(node);
                }
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseConfig;

    fn levels(spec: &[(&str, &[&str])]) -> LevelGroups {
        let releases: Vec<ReleaseConfig> = spec
            .iter()
            .map(|(name, deps)| ReleaseConfig::new(*name, deps))
            .collect();
        let graph = DependencyGraph::build(&releases).expect("valid graph");
        LevelGroups::assign(&graph)
    }

    fn map(spec: &[(usize, &[&str])]) -> BTreeMap<usize, Vec<String>> {
        spec.iter()
            .map(|(l, names)| (*l, names.iter().map(|n| (*n).to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_empty() {
        assert!(levels(&[]).is_empty());
    }

    #[test]
    fn test_simple_dependency() {
        let groups = levels(&[("a", &["b"]), ("b", &[])]);
        assert_eq!(groups.as_map(), &map(&[(0, &["b"]), (1, &["a"])]));
    }

    #[test]
    fn test_diamond() {
        let groups = levels(&[("a", &["c", "b"]), ("b", &["d"]), ("c", &["d"]), ("d", &[])]);
        assert_eq!(
            groups.as_map(),
            &map(&[(0, &["d"]), (1, &["b", "c"]), (2, &["a"])])
        );
    }

    #[test]
    fn test_no_dependencies_keeps_input_order() {
        let groups = levels(&[("a", &[]), ("b", &[]), ("c", &[])]);
        assert_eq!(groups.as_map(), &map(&[(0, &["a", "b", "c"])]));
    }

    #[test]
    fn test_chain() {
        let groups = levels(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        assert_eq!(groups.as_map(), &map(&[(0, &["a"]), (1, &["b"]), (2, &["c"])]));
    }

    #[test]
    fn test_fan_out_preserves_order() {
        let groups = levels(&[("base", &[]), ("x", &["base"]), ("y", &["base"]), ("z", &["base"])]);
        assert_eq!(groups.as_map(), &map(&[(0, &["base"]), (1, &["x", "y", "z"])]));
    }

    #[test]
    fn test_fan_in_preserves_order() {
        let groups = levels(&[("top", &["p", "q", "r"]), ("p", &[]), ("q", &[]), ("r", &[])]);
        assert_eq!(groups.as_map(), &map(&[(0, &["p", "q", "r"]), (1, &["top"])]));
    }

    #[test]
    fn test_longest_chain_wins() {
        // d depends on a directly and via b, so it sits above b
        let groups = levels(&[("a", &[]), ("b", &["a"]), ("d", &["a", "b"])]);
        assert_eq!(groups.level_of("d"), Some(2));
    }

    #[test]
    fn test_partition_and_dependency_order() {
        let spec: &[(&str, &[&str])] = &[
            ("web", &["api", "cache"]),
            ("api", &["db", "queue"]),
            ("worker", &["queue", "db"]),
            ("cache", &[]),
            ("db", &[]),
            ("queue", &["db"]),
            ("metrics", &[]),
        ];
        let groups = levels(spec);

        let mut all: Vec<&String> = groups.iter().flat_map(|(_, names)| names).collect();
        assert_eq!(all.len(), spec.len());
        all.sort();
        all.dedup();
        assert_eq!(all.len(), spec.len());

        for (name, deps) in spec {
            let level = groups.level_of(name).expect("assigned");
            for dep in *deps {
                assert!(groups.level_of(dep).expect("assigned") < level, "{dep} before {name}");
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let releases = vec![
            ReleaseConfig::new("a", &["b"]),
            ReleaseConfig::new("b", &[]),
            ReleaseConfig::new("c", &["a"]),
        ];
        let graph = DependencyGraph::build(&releases).unwrap();
        assert_eq!(LevelGroups::assign(&graph), LevelGroups::assign(&graph));
    }

    #[test]
    fn test_long_chain_levels() {
        let len = 200_000;
        let releases: Vec<ReleaseConfig> = (0..len)
            .map(|i| {
                let mut r = ReleaseConfig::new(format!("r{i}"), &[]);
                if i > 0 {
                    r.depends_on = vec![format!("r{}", i - 1)];
                }
                r
            })
            .rev()
            .collect();
        let graph = DependencyGraph::build(&releases).expect("valid graph");
        let groups = LevelGroups::assign(&graph);

        assert_eq!(groups.len(), len);
        assert_eq!(groups.level_of("r0"), Some(0));
        assert_eq!(groups.level(len - 1), Some(&[format!("r{}", len - 1)][..]));
    }
}
