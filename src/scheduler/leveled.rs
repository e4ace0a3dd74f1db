//! Level-by-level deployment with a bounded worker pool per level.
//!
//! Levels run strictly in ascending order. Within a level at most
//! [`Concurrency`] tasks run at once. The first failure in a level stops
//! new tasks of that level from being launched; tasks already running are
//! left to finish and no later level is started. Cancellation never
//! interrupts work in flight.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{BuildArtifact, Concurrency, ReleaseConfig};
use crate::deployer::ReleaseDeployer;
use crate::error::ScheduleError;
use crate::graph::LevelGroups;
use crate::template::{TemplateEnv, expand, expand_opt};

use super::outcome::{AggregateResult, DeployOutcome};

/// Drives deploy tasks level by level.
pub struct LeveledScheduler<D: ?Sized> {
    /// Collaborator performing each release deploy.
    deployer: Arc<D>,
    /// Per-level task bound.
    concurrency: Concurrency,
    /// Environment for identity field expansion.
    env: Arc<TemplateEnv>,
    /// Artifacts forwarded to every deploy.
    artifacts: Arc<[BuildArtifact]>,
}

/// State shared by the tasks of a run.
#[derive(Default)]
struct SharedState {
    result: AggregateResult,
    first_error: Option<ScheduleError>,
}

impl<D: ReleaseDeployer + ?Sized + 'static> LeveledScheduler<D> {
    /// Creates a scheduler using the process environment for templates.
    #[must_use]
    pub fn new(deployer: Arc<D>, concurrency: Concurrency) -> Self {
        Self {
            deployer,
            concurrency,
            env: Arc::new(TemplateEnv::from_process()),
            artifacts: Arc::from(Vec::new()),
        }
    }

    /// Replaces the template environment.
    #[must_use]
    pub fn with_env(mut self, env: TemplateEnv) -> Self {
        self.env = Arc::new(env);
        self
    }

    /// Sets the build artifacts passed to every deploy.
    #[must_use]
    pub fn with_artifacts(mut self, artifacts: Vec<BuildArtifact>) -> Self {
        self.artifacts = Arc::from(artifacts);
        self
    }

    /// Returns the configured concurrency.
    #[must_use]
    pub const fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Deploys every level in ascending order.
    ///
    /// # Errors
    ///
    /// Returns the first error of the first failing level. Levels before it
    /// have been applied; levels after it are never started.
    pub async fn run(
        &self,
        levels: &LevelGroups,
        releases: &[ReleaseConfig],
    ) -> Result<AggregateResult, ScheduleError> {
        let lookup: HashMap<&str, &ReleaseConfig> =
            releases.iter().map(|r| (r.name.as_str(), r)).collect();
        let state = Arc::new(Mutex::new(SharedState::default()));
        let total = levels.len();

        for (level, names) in levels.iter() {
            if total > 1 {
                info!(
                    "Installing level {}/{} releases ({} releases)",
                    level + 1,
                    total,
                    names.len()
                );
            } else {
                info!("Installing releases ({} releases)", names.len());
            }

            // resolve the whole level first so a lookup failure launches nothing
            let batch = names
                .iter()
                .map(|name| {
                    lookup
                        .get(name.as_str())
                        .map(|r| (*r).clone())
                        .ok_or_else(|| ScheduleError::MissingRelease {
                            release: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            self.run_level(level, batch, &state).await?;
            debug!("Level {level} completed");
        }

        let mut guard = state.lock().await;
        Ok(std::mem::take(&mut guard.result))
    }

    /// Runs one level and waits for every launched task to finish.
    async fn run_level(
        &self,
        level: usize,
        batch: Vec<ReleaseConfig>,
        state: &Arc<Mutex<SharedState>>,
    ) -> Result<(), ScheduleError> {
        let cancel = CancellationToken::new();
        let semaphore = self
            .concurrency
            .limit()
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::with_capacity(batch.len());

        for release in batch {
            let permit = match &semaphore {
                Some(semaphore) => {
                    let acquired = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = acquired else { break };
                    Some(permit)
                }
                None => None,
            };

            if cancel.is_cancelled() {
                break;
            }

            let name = release.name.clone();
            let deployer = Arc::clone(&self.deployer);
            let env = Arc::clone(&self.env);
            let artifacts = Arc::clone(&self.artifacts);
            let state = Arc::clone(state);
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                // Unwinding drops locals in reverse order: the guard cancels the
                // level before the permit frees a slot for the next launch.
                let slot = permit;
                let panic_guard = cancel.clone().drop_guard();
                let result = deploy_release(&*deployer, release, level, &env, &artifacts).await;

                let mut guard = state.lock().await;
                match result {
                    Ok(outcome) => {
                        guard.result.merge(outcome);
                        panic_guard.disarm();
                    }
                    Err(e) => {
                        error!("{e}");
                        if guard.first_error.is_none() {
                            guard.first_error = Some(e);
                        }
                        cancel.cancel();
                    }
                }
                drop(guard);
                drop(slot);
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            if let Err(e) = handle.await {
                let mut guard = state.lock().await;
                if guard.first_error.is_none() {
                    guard.first_error = Some(ScheduleError::TaskAborted {
                        release: name,
                        level,
                        message: e.to_string(),
                    });
                }
            }
        }

        let mut guard = state.lock().await;
        guard.first_error.take().map_or(Ok(()), Err)
    }
}

/// One deploy task: expands identity fields then calls the collaborator.
async fn deploy_release<D: ReleaseDeployer + ?Sized>(
    deployer: &D,
    mut release: ReleaseConfig,
    level: usize,
    env: &TemplateEnv,
    artifacts: &[BuildArtifact],
) -> Result<DeployOutcome, ScheduleError> {
    expand_identity(&mut release, level, env)?;

    debug!("Deploying release {} (level {level})", release.name);

    deployer
        .deploy(&release, artifacts)
        .await
        .map_err(|e| ScheduleError::Deploy {
            release: release.name.clone(),
            level,
            source: Box::new(e),
        })
}

/// Expands the templated identity fields of a release in place.
///
/// Order is chart version, repo, chart path, then name. The first failure
/// is returned and leaves later fields untouched.
fn expand_identity(
    release: &mut ReleaseConfig,
    level: usize,
    env: &TemplateEnv,
) -> Result<(), ScheduleError> {
    let raw_name = release.name.clone();
    let failed = |field: &'static str, template: &str| {
        let release = raw_name.clone();
        let template = template.to_string();
        move |source| ScheduleError::TemplateExpansion {
            release,
            level,
            field,
            template,
            source,
        }
    };

    release.version = expand_opt(release.version.as_deref(), env)
        .map_err(failed("chart version", release.version.as_deref().unwrap_or_default()))?;
    release.repo = expand_opt(release.repo.as_deref(), env)
        .map_err(failed("repo", release.repo.as_deref().unwrap_or_default()))?;
    release.chart_path = expand_opt(release.chart_path.as_deref(), env)
        .map_err(failed("chart path", release.chart_path.as_deref().unwrap_or_default()))?;
    release.name = expand(&raw_name, env).map_err(failed("release name", &raw_name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReleaseError, Result};
    use crate::graph::DependencyGraph;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fake deployer recording start/finish order and peak parallelism.
    #[derive(Default)]
    struct FakeDeployer {
        running: AtomicUsize,
        peak: AtomicUsize,
        events: std::sync::Mutex<Vec<String>>,
        fail: Vec<String>,
        panic_on: Vec<String>,
        delay_ms: u64,
    }

    impl FakeDeployer {
        fn failing(names: &[&str]) -> Self {
            Self {
                fail: names.iter().map(|n| (*n).to_string()).collect(),
                ..Self::default()
            }
        }

        fn with_delay(mut self, delay_ms: u64) -> Self {
            self.delay_ms = delay_ms;
            self
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn started(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| e.strip_prefix("start:").map(String::from))
                .collect()
        }
    }

    #[async_trait]
    impl ReleaseDeployer for FakeDeployer {
        async fn deploy(
            &self,
            release: &ReleaseConfig,
            _artifacts: &[BuildArtifact],
        ) -> Result<DeployOutcome> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.events.lock().unwrap().push(format!("start:{}", release.name));
            if self.panic_on.contains(&release.name) {
                self.running.fetch_sub(1, Ordering::SeqCst);
                panic!("{} crashed", release.name);
            }

            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

            self.events.lock().unwrap().push(format!("end:{}", release.name));
            self.running.fetch_sub(1, Ordering::SeqCst);

            if self.fail.contains(&release.name) {
                return Err(ReleaseError::internal(format!("{} exploded", release.name)));
            }
            Ok(DeployOutcome::new(
                format!("name: {}", release.name).into_bytes(),
                release.namespace.clone().unwrap_or_default(),
            ))
        }

        async fn uninstall(&self, _release: &ReleaseConfig) -> Result<()> {
            Ok(())
        }
    }

    fn plan(spec: &[(&str, &[&str])]) -> (LevelGroups, Vec<ReleaseConfig>) {
        let releases: Vec<ReleaseConfig> = spec
            .iter()
            .map(|(name, deps)| {
                let mut r = ReleaseConfig::new(*name, deps);
                r.namespace = Some(format!("ns-{name}"));
                r
            })
            .collect();
        let graph = DependencyGraph::build(&releases).expect("valid graph");
        (LevelGroups::assign(&graph), releases)
    }

    fn scheduler(deployer: &Arc<FakeDeployer>, concurrency: u32) -> LeveledScheduler<FakeDeployer> {
        LeveledScheduler::new(Arc::clone(deployer), Concurrency::from(concurrency))
            .with_env(TemplateEnv::new().with("ENV", "dev"))
    }

    #[tokio::test]
    async fn test_sequential_run_aggregates() {
        let deployer = Arc::new(FakeDeployer::default());
        let (levels, releases) = plan(&[("a", &["b"]), ("b", &[]), ("c", &[])]);

        let result = scheduler(&deployer, 1).run(&levels, &releases).await.expect("run");

        assert_eq!(result.manifests.len(), 3);
        assert_eq!(result.deployed, 3);
        assert_eq!(result.namespaces.len(), 3);
        assert_eq!(deployer.started(), vec!["b", "c", "a"]);
        assert_eq!(deployer.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_levels() {
        let deployer = Arc::new(FakeDeployer::default());
        let result = scheduler(&deployer, 0)
            .run(&LevelGroups::default(), &[])
            .await
            .expect("run");
        assert_eq!(result, AggregateResult::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_bound_respected() {
        let deployer = Arc::new(FakeDeployer::default().with_delay(30));
        let owned: Vec<(String, Vec<&str>)> = (0..8).map(|i| (format!("r{i}"), vec![])).collect();
        let spec: Vec<(&str, &[&str])> = owned.iter().map(|(n, d)| (n.as_str(), d.as_slice())).collect();
        let (levels, releases) = plan(&spec);

        scheduler(&deployer, 3).run(&levels, &releases).await.expect("run");

        let peak = deployer.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak} exceeded bound");
        assert!(peak > 1, "expected parallel execution");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unlimited_runs_whole_level_at_once() {
        let deployer = Arc::new(FakeDeployer::default().with_delay(50));
        let (levels, releases) = plan(&[("a", &[]), ("b", &[]), ("c", &[]), ("d", &[])]);

        scheduler(&deployer, 0).run(&levels, &releases).await.expect("run");

        assert_eq!(deployer.peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_level_barrier() {
        let deployer = Arc::new(FakeDeployer::default().with_delay(20));
        let (levels, releases) = plan(&[
            ("app", &["db", "cache"]),
            ("db", &[]),
            ("cache", &[]),
            ("edge", &["app"]),
        ]);

        scheduler(&deployer, 0).run(&levels, &releases).await.expect("run");

        let events = deployer.events();
        let position = |e: &str| events.iter().position(|x| x == e).expect("event");
        assert!(position("end:db") < position("start:app"));
        assert!(position("end:cache") < position("start:app"));
        assert!(position("end:app") < position("start:edge"));
    }

    #[tokio::test]
    async fn test_failure_short_circuits_later_levels() {
        let deployer = Arc::new(FakeDeployer::failing(&["b"]));
        let (levels, releases) = plan(&[("a", &["b"]), ("b", &[]), ("c", &[])]);

        let err = scheduler(&deployer, 0).run(&levels, &releases).await.unwrap_err();

        match err {
            ScheduleError::Deploy { release, level, .. } => {
                assert_eq!(release, "b");
                assert_eq!(level, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!deployer.started().contains(&String::from("a")));
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_launching_in_level() {
        let deployer = Arc::new(FakeDeployer::failing(&["x"]));
        let (levels, releases) = plan(&[("x", &[]), ("y", &[]), ("z", &[])]);

        let err = scheduler(&deployer, 1).run(&levels, &releases).await.unwrap_err();

        assert!(err.to_string().contains("x exploded"));
        assert_eq!(deployer.started(), vec!["x"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_running_siblings_finish_after_failure() {
        let deployer = Arc::new(FakeDeployer::failing(&["a"]).with_delay(20));
        let (levels, releases) = plan(&[("a", &[]), ("b", &[]), ("c", &[])]);

        let result = scheduler(&deployer, 0).run(&levels, &releases).await;

        assert!(result.is_err());
        let events = deployer.events();
        for name in ["a", "b", "c"] {
            assert!(events.contains(&format!("end:{name}")), "{name} did not finish");
        }
        assert_eq!(deployer.running.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_template_expansion_failure_fails_task() {
        let deployer = Arc::new(FakeDeployer::default());
        let (levels, mut releases) = plan(&[("a", &[])]);
        releases[0].version = Some(String::from("{{.MISSING}}"));

        let err = scheduler(&deployer, 1).run(&levels, &releases).await.unwrap_err();

        assert!(matches!(
            err,
            ScheduleError::TemplateExpansion { field: "chart version", level: 0, .. }
        ));
        assert!(deployer.started().is_empty());
    }

    #[tokio::test]
    async fn test_name_expanded_before_deploy() {
        let deployer = Arc::new(FakeDeployer::default());
        let (levels, releases) = plan(&[("{{.ENV}}-api", &["{{.ENV}}-db"]), ("{{.ENV}}-db", &[])]);

        scheduler(&deployer, 1).run(&levels, &releases).await.expect("run");

        assert_eq!(deployer.started(), vec!["dev-db", "dev-api"]);
    }

    #[tokio::test]
    async fn test_missing_release_launches_nothing() {
        let deployer = Arc::new(FakeDeployer::default());
        let (levels, releases) = plan(&[("a", &[]), ("b", &[])]);

        let err = scheduler(&deployer, 1).run(&levels, &releases[..1]).await.unwrap_err();

        assert!(matches!(err, ScheduleError::MissingRelease { .. }));
        assert!(deployer.started().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_task_stops_launching_in_level() {
        let deployer = Arc::new(FakeDeployer {
            panic_on: vec![String::from("x")],
            ..FakeDeployer::default()
        });
        let (levels, releases) = plan(&[("x", &[]), ("y", &[]), ("z", &[])]);

        let err = scheduler(&deployer, 1).run(&levels, &releases).await.unwrap_err();

        match err {
            ScheduleError::TaskAborted { release, level, .. } => {
                assert_eq!(release, "x");
                assert_eq!(level, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(deployer.started(), vec!["x"]);
    }
}
