//! Per-release deploy outcomes and the run-wide aggregate.

use serde::Serialize;
use std::collections::BTreeSet;

/// What a single release deploy produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Namespace the release was deployed to; empty if skipped.
    pub namespace: String,
    /// Rendered manifest of the release; empty if skipped.
    pub manifest: Vec<u8>,
}

/// Merged results of every successful deploy task in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    /// Non-empty manifests in merge order.
    #[serde(skip)]
    pub manifests: Vec<Vec<u8>>,
    /// Distinct non-empty namespaces touched.
    pub namespaces: BTreeSet<String>,
    /// Number of tasks that completed successfully.
    pub deployed: usize,
    /// Number of those tasks that were skipped by policy.
    pub skipped: usize,
}

impl DeployOutcome {
    /// Creates an outcome for a deployed release.
    #[must_use]
    pub fn new(manifest: Vec<u8>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            manifest,
        }
    }

    /// Creates an outcome for a release whose deploy step was skipped.
    #[must_use]
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Returns true if the deploy step was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.manifest.is_empty() && self.namespace.trim().is_empty()
    }
}

impl AggregateResult {
    /// Merges one task's outcome.
    pub fn merge(&mut self, outcome: DeployOutcome) {
        self.deployed += 1;
        if outcome.is_skipped() {
            self.skipped += 1;
        }

        if !outcome.manifest.is_empty() {
            self.manifests.push(outcome.manifest);
        }

        let namespace = outcome.namespace.trim();
        if !namespace.is_empty() {
            self.namespaces.insert(namespace.to_string());
        }
    }

    /// Returns all manifests joined as one multi-document YAML stream.
    #[must_use]
    pub fn joined_manifests(&self) -> String {
        self.manifests
            .iter()
            .map(|m| String::from_utf8_lossy(m))
            .collect::<Vec<_>>()
            .join("\n---\n")
    }
}
