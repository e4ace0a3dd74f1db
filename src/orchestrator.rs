//! One orchestration run over a deploy configuration.
//!
//! The orchestrator owns the whole pipeline: build and validate the
//! dependency graph, assign levels, hand the levels to the scheduler, then
//! derive post-run warnings from the aggregate result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BuildArtifact, DeployConfig};
use crate::deployer::ReleaseDeployer;
use crate::error::{ReleaseError, Result, ScheduleError};
use crate::graph::{DependencyGraph, LevelGroups};
use crate::scheduler::{AggregateResult, LeveledScheduler};
use crate::template::{self, TemplateEnv};

/// Drives a deploy configuration through graph, levels and scheduler.
pub struct Orchestrator<D: ?Sized> {
    /// Configuration being deployed.
    config: DeployConfig,
    /// Collaborator performing each release deploy.
    deployer: Arc<D>,
    /// Environment for identity field expansion.
    env: TemplateEnv,
}

/// Result of a successful orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentSummary {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last level finished.
    pub finished_at: DateTime<Utc>,
    /// Number of levels scheduled.
    pub level_count: usize,
    /// Number of releases scheduled.
    pub release_count: usize,
    /// Merged deploy outcomes.
    pub result: AggregateResult,
    /// Non-fatal findings about the run.
    pub warnings: Vec<String>,
}

impl DeploymentSummary {
    /// Returns the touched namespaces in sorted order.
    #[must_use]
    pub fn namespaces(&self) -> Vec<&str> {
        self.result.namespaces.iter().map(String::as_str).collect()
    }

    /// Returns the wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl<D: ReleaseDeployer + ?Sized + 'static> Orchestrator<D> {
    /// Creates an orchestrator using the process environment for templates.
    #[must_use]
    pub fn new(config: DeployConfig, deployer: Arc<D>) -> Self {
        Self {
            config,
            deployer,
            env: TemplateEnv::from_process(),
        }
    }

    /// Replaces the template environment.
    #[must_use]
    pub fn with_env(mut self, env: TemplateEnv) -> Self {
        self.env = env;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Computes the deployment levels without touching any release.
    ///
    /// # Errors
    ///
    /// Returns a graph error for duplicate names, unknown dependencies or a
    /// dependency cycle.
    pub fn plan(&self) -> Result<LevelGroups> {
        let graph = DependencyGraph::build(&self.config.releases)?;
        Ok(LevelGroups::assign(&graph))
    }

    /// Deploys every release level by level.
    ///
    /// # Errors
    ///
    /// Returns a graph error before any deploy, or the first scheduling
    /// error of the first failing level.
    pub async fn run(&self, artifacts: &[BuildArtifact]) -> Result<DeploymentSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let levels = self.plan()?;
        let concurrency = self.config.concurrency;

        if concurrency.is_sequential() {
            info!("Installing {} releases sequentially", levels.release_count());
        } else {
            info!(
                "Installing {} releases concurrently (concurrency: {concurrency})",
                levels.release_count()
            );
        }
        debug!("Run {run_id}: {} levels", levels.len());

        let scheduler = LeveledScheduler::new(Arc::clone(&self.deployer), concurrency)
            .with_env(self.env.clone())
            .with_artifacts(artifacts.to_vec());
        let result = scheduler.run(&levels, &self.config.releases).await?;

        let warnings = if self.config.multi_config {
            Vec::new()
        } else {
            unused_images(artifacts, &result)
        };
        for w in &warnings {
            warn!("{w}");
        }

        let finished_at = Utc::now();
        info!(
            "Deployed {} releases in {}ms",
            result.deployed,
            (finished_at - started_at).num_milliseconds()
        );

        Ok(DeploymentSummary {
            run_id,
            started_at,
            finished_at,
            level_count: levels.len(),
            release_count: levels.release_count(),
            result,
            warnings,
        })
    }

    /// Uninstalls every release, highest level first.
    ///
    /// Releases are removed one at a time. Only the release name is
    /// expanded, so chart fields referencing build-time variables do not
    /// block removal. An uninstall failure is recorded and the teardown
    /// moves on to the next release.
    ///
    /// # Errors
    ///
    /// Returns a graph error before any removal, a template error when a
    /// name cannot be expanded, or [`ReleaseError::Teardown`] listing every
    /// release that could not be removed.
    pub async fn teardown(&self) -> Result<Vec<String>> {
        let levels = self.plan()?;
        let mut removed = Vec::with_capacity(levels.release_count());
        let mut failures = Vec::new();

        for (level, names) in levels.iter().rev() {
            info!("Removing level {} ({} releases)", level + 1, names.len());
            for name in names {
                let mut release = self
                    .config
                    .release(name)
                    .cloned()
                    .ok_or_else(|| ScheduleError::MissingRelease {
                        release: name.clone(),
                    })?;
                release.name = template::expand(name, &self.env).map_err(|source| {
                    ScheduleError::TemplateExpansion {
                        release: name.clone(),
                        level,
                        field: "release name",
                        template: name.clone(),
                        source,
                    }
                })?;

                match self.deployer.uninstall(&release).await {
                    Ok(()) => removed.push(release.name),
                    Err(e) => {
                        warn!("Failed to remove release {}: {e}", release.name);
                        failures.push(format!("{}: {e}", release.name));
                    }
                }
            }
        }

        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(ReleaseError::Teardown { failures })
        }
    }
}

/// Returns one warning per artifact whose tag is not the `image` of any
/// manifest object.
fn unused_images(artifacts: &[BuildArtifact], result: &AggregateResult) -> Vec<String> {
    let used = manifest_images(&result.joined_manifests());
    artifacts
        .iter()
        .filter(|a| !used.contains(a.tag.as_str()))
        .map(|a| format!("image [{}] is not used.", a.tag))
        .collect()
}

/// Collects every string value stored under an `image` key in a
/// multi-document YAML stream. Documents that do not parse are skipped.
fn manifest_images(manifests: &str) -> HashSet<String> {
    let mut images = HashSet::new();
    for document in serde_yaml::Deserializer::from_str(manifests) {
        match Value::deserialize(document) {
            Ok(value) => collect_images(&value, &mut images),
            Err(e) => debug!("Skipping unparsable manifest document: {e}"),
        }
    }
    images
}

fn collect_images(value: &Value, images: &mut HashSet<String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if key.as_str() == Some("image")
                    && let Some(image) = child.as_str()
                {
                    images.insert(image.to_string());
                }
                collect_images(child, images);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                collect_images(item, images);
            }
        }
        Value::Tagged(tagged) => collect_images(&tagged.value, images),
        _ => {}
    }
}
