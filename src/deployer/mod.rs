//! Deploy collaborators used by the scheduler.
//!
//! The scheduler only knows the [`ReleaseDeployer`] trait. The helm
//! implementation and the confirmation poller live here as well.

mod confirm;
mod helm;
mod runner;

use async_trait::async_trait;

use crate::config::{BuildArtifact, ReleaseConfig};
use crate::error::Result;
use crate::scheduler::DeployOutcome;

pub use confirm::ConfirmationPoller;
pub use helm::HelmDeployer;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};

/// Deploys and removes a single release.
///
/// Implementations receive a private copy of the release whose name,
/// version, repo and chart path are already expanded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReleaseDeployer: Send + Sync {
    /// Installs or upgrades one release and returns its manifest and namespace.
    async fn deploy(
        &self,
        release: &ReleaseConfig,
        artifacts: &[BuildArtifact],
    ) -> Result<DeployOutcome>;

    /// Removes one release.
    async fn uninstall(&self, release: &ReleaseConfig) -> Result<()>;
}
