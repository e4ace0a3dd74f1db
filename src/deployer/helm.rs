//! Release deployer backed by the helm CLI.
//!
//! One deploy is a short sequence of helm invocations:
//! `get all` to detect an existing release, an optional `dep build`, an
//! optional `package`, `install` or `upgrade`, then `get manifest` polled
//! until the release is visible.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BuildArtifact, HelmConfig, HelmPackaged, ReleaseConfig};
use crate::error::{ConfigError, HelmError, Result};
use crate::scheduler::DeployOutcome;
use crate::template::{TemplateEnv, expand};

use super::ReleaseDeployer;
use super::confirm::ConfirmationPoller;
use super::runner::{CommandRunner, ProcessRunner};

/// Namespace used when neither the release nor the config sets one.
const FALLBACK_NAMESPACE: &str = "default";

/// Deploys releases by shelling out to helm.
pub struct HelmDeployer<R = ProcessRunner> {
    runner: R,
    helm: HelmConfig,
    default_namespace: Option<String>,
    poller: ConfirmationPoller,
    env: TemplateEnv,
}

impl HelmDeployer<ProcessRunner> {
    /// Creates a deployer running the real helm binary.
    #[must_use]
    pub fn new(helm: HelmConfig, default_namespace: Option<String>) -> Self {
        Self::with_runner(ProcessRunner, helm, default_namespace)
    }
}

impl<R: CommandRunner> HelmDeployer<R> {
    /// Creates a deployer over a custom command runner.
    #[must_use]
    pub fn with_runner(runner: R, helm: HelmConfig, default_namespace: Option<String>) -> Self {
        Self {
            runner,
            helm,
            default_namespace,
            poller: ConfirmationPoller::default(),
            env: TemplateEnv::from_process(),
        }
    }

    /// Replaces the confirmation poller.
    #[must_use]
    pub const fn with_poller(mut self, poller: ConfirmationPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Replaces the environment used to expand `set_values` templates.
    #[must_use]
    pub fn with_env(mut self, env: TemplateEnv) -> Self {
        self.env = env;
        self
    }

    /// Returns the namespace a release deploys to.
    #[must_use]
    pub fn namespace_for(&self, release: &ReleaseConfig) -> String {
        release
            .namespace
            .as_deref()
            .or(self.default_namespace.as_deref())
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(FALLBACK_NAMESPACE)
            .to_string()
    }

    /// Runs helm and fails on a non-zero exit.
    async fn helm(&self, mut args: Vec<String>) -> Result<Vec<u8>> {
        args.extend(self.global_args());
        let output = self.runner.run(&self.helm.binary, &args, &[]).await?;
        if !output.success() {
            return Err(HelmError::command_failed(&args, output.code, output.stderr.trim()).into());
        }
        Ok(output.stdout)
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = self.helm.flags.global.clone();
        if let Some(ctx) = &self.helm.kube_context {
            args.push(String::from("--kube-context"));
            args.push(ctx.clone());
        }
        args
    }

    async fn is_installed(&self, name: &str, namespace: &str) -> bool {
        let args = vec![
            String::from("get"),
            String::from("all"),
            name.to_string(),
            String::from("--namespace"),
            namespace.to_string(),
        ];
        match self.helm(args).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Release {name} not found in {namespace}: {e}");
                false
            }
        }
    }

    async fn build_dependencies(&self, chart: &str) -> Result<()> {
        let mut args = vec![String::from("dep"), String::from("build"), chart.to_string()];
        args.extend(self.helm.flags.dep_build.iter().cloned());
        self.helm(args).await.map(|_| ())
    }

    async fn get_manifest(&self, name: &str, namespace: &str) -> Result<Vec<u8>> {
        let args = vec![
            String::from("get"),
            String::from("manifest"),
            name.to_string(),
            String::from("--namespace"),
            namespace.to_string(),
        ];
        self.helm(args).await
    }

    /// Writes non-empty overrides to a uniquely named values file.
    async fn write_overrides(&self, release: &ReleaseConfig) -> Result<Option<PathBuf>> {
        if release.overrides.is_empty() {
            return Ok(None);
        }

        let content = serde_yaml::to_string(&release.overrides).map_err(|e| HelmError::Overrides {
            message: e.to_string(),
        })?;
        let path = std::env::temp_dir().join(format!("releasegraph-overrides-{}.yaml", Uuid::new_v4()));
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| HelmError::Overrides {
                message: format!("{}: {e}", path.display()),
            })?;

        debug!("Wrote overrides for {} to {}", release.name, path.display());
        Ok(Some(path))
    }

    /// Packages a local chart into `destination` and returns the archive path.
    ///
    /// Helm reports the archive location on stdout; the path is everything
    /// from the destination directory onwards.
    async fn package_chart(
        &self,
        chart: &str,
        packaged: &HelmPackaged,
        destination: &Path,
    ) -> Result<String> {
        let dir = destination.display().to_string();
        let mut args = vec![
            String::from("package"),
            chart.to_string(),
            String::from("--destination"),
            dir.clone(),
        ];
        if let Some(version) = &packaged.version {
            args.push(String::from("--version"));
            args.push(expand(version, &self.env)?);
        }
        if let Some(app_version) = &packaged.app_version {
            args.push(String::from("--app-version"));
            args.push(expand(app_version, &self.env)?);
        }

        let stdout = self.helm(args).await?;
        let output = String::from_utf8_lossy(&stdout);
        let output = output.trim();
        let archive = output.find(&dir).map(|idx| output[idx..].to_string());
        archive.ok_or_else(|| {
            HelmError::Package {
                message: format!("unable to find {dir} in output: {output}"),
            }
            .into()
        })
    }

    /// Runs `install` or `upgrade`, packaging the chart first when asked to.
    async fn apply(
        &self,
        release: &ReleaseConfig,
        namespace: &str,
        upgrade: bool,
        overrides: Option<&Path>,
        artifacts: &[BuildArtifact],
    ) -> Result<()> {
        let chart = release.chart_source().ok_or_else(|| {
            ConfigError::validation(format!("release {} has no chart", release.name), "chart_path")
        })?;

        let Some(packaged) = release.packaged.as_ref().filter(|_| !release.is_remote()) else {
            let args = self.install_args(release, chart, namespace, upgrade, overrides, artifacts)?;
            return self.helm(args).await.map(|_| ());
        };

        let destination = std::env::temp_dir().join(format!("releasegraph-helm-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|e| HelmError::Package {
                message: format!("{}: {e}", destination.display()),
            })?;

        let applied = match self.package_chart(chart, packaged, &destination).await {
            Ok(archive) => {
                info!("Packaged chart {chart} into {archive}");
                match self.install_args(release, &archive, namespace, upgrade, overrides, artifacts) {
                    Ok(args) => self.helm(args).await.map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_dir_all(&destination).await {
            warn!("Unable to remove package directory {}: {e}", destination.display());
        }
        applied
    }

    /// Builds the `install`/`upgrade` argument list for `chart`.
    fn install_args(
        &self,
        release: &ReleaseConfig,
        chart: &str,
        namespace: &str,
        upgrade: bool,
        overrides: Option<&Path>,
        artifacts: &[BuildArtifact],
    ) -> Result<Vec<String>> {
        let mut args = if upgrade {
            vec![String::from("upgrade"), release.name.clone(), chart.to_string()]
        } else {
            vec![String::from("install"), release.name.clone(), chart.to_string()]
        };
        args.push(String::from("--namespace"));
        args.push(namespace.to_string());

        if let Some(version) = &release.version {
            args.push(String::from("--version"));
            args.push(version.clone());
        }
        if let Some(repo) = &release.repo {
            args.push(String::from("--repo"));
            args.push(repo.clone());
        }

        for file in &release.values_files {
            args.push(String::from("-f"));
            args.push(file.clone());
        }
        if let Some(path) = overrides {
            args.push(String::from("-f"));
            args.push(path.display().to_string());
        }

        let env = artifacts
            .iter()
            .fold(self.env.clone(), |env, a| env.with(artifact_var(&a.image), a.tag.clone()));
        for (key, value) in &release.set_values {
            args.push(String::from("--set"));
            args.push(format!("{key}={}", expand(value, &env)?));
        }

        if release.wait {
            args.push(String::from("--wait"));
        }

        let extra = if upgrade {
            &self.helm.flags.upgrade
        } else {
            &self.helm.flags.install
        };
        args.extend(extra.iter().cloned());

        Ok(args)
    }
}

/// Template variable carrying the tag of a built image.
fn artifact_var(image: &str) -> String {
    let key: String = image
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("IMAGE_TAG_{key}")
}

#[async_trait]
impl<R: CommandRunner> ReleaseDeployer for HelmDeployer<R> {
    async fn deploy(
        &self,
        release: &ReleaseConfig,
        artifacts: &[BuildArtifact],
    ) -> Result<DeployOutcome> {
        let namespace = self.namespace_for(release);
        let installed = self.is_installed(&release.name, &namespace).await;

        if installed {
            match release.upgrade_on_change {
                Some(false) => {
                    info!("Release {} already installed, skipping upgrade", release.name);
                    return Ok(DeployOutcome::skipped());
                }
                None if release.is_remote() => {
                    info!(
                        "Release {} not upgraded as it is remote and upgrade_on_change is unset",
                        release.name
                    );
                    return Ok(DeployOutcome::skipped());
                }
                _ => {}
            }
        } else {
            info!("Helm release {} not installed. Installing...", release.name);
        }

        if !release.skip_build_dependencies
            && !release.is_remote()
            && let Some(chart) = &release.chart_path
        {
            info!("Building helm dependencies for {chart}");
            self.build_dependencies(chart).await?;
        }

        let overrides = self.write_overrides(release).await?;
        let applied = self
            .apply(release, &namespace, installed, overrides.as_deref(), artifacts)
            .await;
        if let Some(path) = &overrides
            && let Err(e) = tokio::fs::remove_file(path).await
        {
            warn!("Unable to remove overrides file {}: {e}", path.display());
        }
        applied?;

        let what = format!("release {}", release.name);
        let manifest = self
            .poller
            .poll(&what, || self.get_manifest(&release.name, &namespace))
            .await
            .map_err(|e| HelmError::NotConfirmed {
                release: release.name.clone(),
                message: e.to_string(),
            })?;

        Ok(DeployOutcome::new(manifest, namespace))
    }

    async fn uninstall(&self, release: &ReleaseConfig) -> Result<()> {
        let namespace = self.namespace_for(release);
        info!("Uninstalling release {} from {namespace}", release.name);
        let args = vec![
            String::from("uninstall"),
            release.name.clone(),
            String::from("--namespace"),
            namespace,
        ];
        self.helm(args).await.map(|_| ())
    }
}
