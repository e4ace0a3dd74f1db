//! Configuration specification types for the deployment system.
//!
//! This module defines all the structs that map to the `releasegraph.yaml` file.
//! Release fields other than `name` and `depends_on` are opaque to the
//! scheduler and only interpreted by the deploy collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroUsize;

/// The root configuration structure for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployConfig {
    /// Namespace used for releases that do not set one.
    #[serde(default)]
    pub namespace: Option<String>,
    /// How many releases of one level may deploy at once.
    #[serde(default)]
    pub concurrency: Concurrency,
    /// Helm invocation settings.
    #[serde(default)]
    pub helm: HelmConfig,
    /// Whether this deployer is one of several in a multi-config project.
    #[serde(default)]
    pub multi_config: bool,
    /// Build artifacts handed to every release deploy.
    #[serde(default)]
    pub artifacts: Vec<BuildArtifact>,
    /// Releases to deploy, in declaration order.
    #[serde(default)]
    pub releases: Vec<ReleaseConfig>,
}

/// Bound on concurrently running deploy tasks within one level.
///
/// Deserialized from an integer: `0` is unlimited, any other value `N`
/// admits at most `N` tasks at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Concurrency {
    /// At most this many tasks run at once.
    Bounded(NonZeroUsize),
    /// One task per release in the level.
    Unlimited,
}

/// Helm invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelmConfig {
    /// Helm binary to execute.
    #[serde(default = "default_helm_binary")]
    pub binary: String,
    /// Kubernetes context passed as `--kube-context`.
    #[serde(default)]
    pub kube_context: Option<String>,
    /// Extra flags per helm sub-command.
    #[serde(default)]
    pub flags: HelmFlags,
}

/// Extra flags appended to helm sub-commands.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelmFlags {
    /// Flags added to every invocation.
    #[serde(default)]
    pub global: Vec<String>,
    /// Flags added to `helm install`.
    #[serde(default)]
    pub install: Vec<String>,
    /// Flags added to `helm upgrade`.
    #[serde(default)]
    pub upgrade: Vec<String>,
    /// Flags added to `helm dep build`.
    #[serde(default)]
    pub dep_build: Vec<String>,
}

/// A built image made available to release deploys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Image name as referenced by charts.
    pub image: String,
    /// Fully qualified tag that was built.
    pub tag: String,
}

/// Packages a local chart into an archive before installing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelmPackaged {
    /// Chart version written into the archive; may contain `{{.VAR}}`.
    #[serde(default)]
    pub version: Option<String>,
    /// App version written into the archive; may contain `{{.VAR}}`.
    #[serde(default)]
    pub app_version: Option<String>,
}

/// Configuration for a single release.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseConfig {
    /// Release name; may contain `{{.VAR}}` placeholders.
    pub name: String,
    /// Local chart directory.
    #[serde(default)]
    pub chart_path: Option<String>,
    /// Remote chart reference (`repo/chart` or URL).
    #[serde(default)]
    pub remote_chart: Option<String>,
    /// Chart version constraint.
    #[serde(default)]
    pub version: Option<String>,
    /// Chart repository URL.
    #[serde(default)]
    pub repo: Option<String>,
    /// Target namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Values files passed with `-f`.
    #[serde(default)]
    pub values_files: Vec<String>,
    /// Values passed with `--set`.
    #[serde(default)]
    pub set_values: BTreeMap<String, String>,
    /// Inline values written to a temporary overrides file.
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_yaml::Value>,
    /// Releases that must be deployed first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Skip `helm dep build` for local charts.
    #[serde(default)]
    pub skip_build_dependencies: bool,
    /// Whether an installed release is upgraded on later runs.
    #[serde(default)]
    pub upgrade_on_change: Option<bool>,
    /// Pass `--wait` to install/upgrade.
    #[serde(default)]
    pub wait: bool,
    /// Install a packaged archive of the local chart instead of its directory.
    #[serde(default)]
    pub packaged: Option<HelmPackaged>,
}

fn default_helm_binary() -> String {
    String::from("helm")
}

impl Default for Concurrency {
    fn default() -> Self {
        Self::Bounded(NonZeroUsize::MIN)
    }
}

impl From<u32> for Concurrency {
    fn from(value: u32) -> Self {
        usize::try_from(value)
            .ok()
            .and_then(NonZeroUsize::new)
            .map_or(Self::Unlimited, Self::Bounded)
    }
}

impl From<Concurrency> for u32 {
    fn from(value: Concurrency) -> Self {
        match value {
            Concurrency::Bounded(n) => Self::try_from(n.get()).unwrap_or(Self::MAX),
            Concurrency::Unlimited => 0,
        }
    }
}

impl Concurrency {
    /// Returns true if tasks within a level run one at a time.
    #[must_use]
    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::Bounded(n) if n.get() == 1)
    }

    /// Returns the task bound, or `None` when unlimited.
    #[must_use]
    pub const fn limit(self) -> Option<usize> {
        match self {
            Self::Bounded(n) => Some(n.get()),
            Self::Unlimited => None,
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(n) => write!(f, "{n}"),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: default_helm_binary(),
            kube_context: None,
            flags: HelmFlags::default(),
        }
    }
}

impl DeployConfig {
    /// Returns release names in declaration order.
    #[must_use]
    pub fn release_names(&self) -> Vec<&str> {
        self.releases.iter().map(|r| r.name.as_str()).collect()
    }

    /// Finds a release by its raw (unexpanded) name.
    #[must_use]
    pub fn release(&self, name: &str) -> Option<&ReleaseConfig> {
        self.releases.iter().find(|r| r.name == name)
    }
}

impl ReleaseConfig {
    /// Creates a release with the given name and dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, depends_on: &[&str]) -> Self {
        Self {
            name: name.into(),
            depends_on: depends_on.iter().map(|d| (*d).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Returns the chart reference passed to helm.
    #[must_use]
    pub fn chart_source(&self) -> Option<&str> {
        self.remote_chart
            .as_deref()
            .or(self.chart_path.as_deref())
    }

    /// Returns true if the chart comes from a remote repository.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        self.remote_chart.is_some()
    }
}
