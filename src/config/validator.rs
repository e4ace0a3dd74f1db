//! Configuration validation for deployment configs.
//!
//! Checks per-release settings before a graph is built. Dependency graph
//! rules (duplicate names, unknown dependencies, cycles) are enforced by
//! [`crate::graph::DependencyGraph`], not here.

use crate::error::{ConfigError, ReleaseError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{Concurrency, DeployConfig, ReleaseConfig};

/// Above this many releases, unlimited concurrency is flagged.
const UNLIMITED_WARN_THRESHOLD: usize = 16;

/// Validator for deployment configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a deployment configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &DeployConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        match result.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(result)
            }
            Some(first) => Err(ReleaseError::Config(ConfigError::validation(
                first.message.clone(),
                first.field.clone(),
            ))),
        }
    }

    /// Runs every check and collects errors and warnings without failing.
    #[must_use]
    pub fn check(&self, config: &DeployConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.releases.is_empty() {
            result.warnings.push(String::from("No releases defined in configuration"));
        }

        for (i, release) in config.releases.iter().enumerate() {
            Self::validate_release(release, &format!("releases[{i}]"), &mut result);
        }

        if config.concurrency == Concurrency::Unlimited
            && config.releases.len() > UNLIMITED_WARN_THRESHOLD
        {
            result.warnings.push(format!(
                "concurrency: unlimited concurrency with {} releases may overload the cluster API",
                config.releases.len()
            ));
        }

        result
    }

    /// Validates a single release.
    fn validate_release(release: &ReleaseConfig, prefix: &str, result: &mut ValidationResult) {
        if release.name.trim().is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.name"),
                message: String::from("Release name cannot be empty"),
            });
        }

        match (&release.chart_path, &release.remote_chart) {
            (None, None) => result.errors.push(ValidationError {
                field: format!("{prefix}.chart_path"),
                message: format!(
                    "Release '{}' must set either chart_path or remote_chart",
                    release.name
                ),
            }),
            (Some(_), Some(_)) => result.errors.push(ValidationError {
                field: format!("{prefix}.remote_chart"),
                message: format!(
                    "Release '{}' cannot set both chart_path and remote_chart",
                    release.name
                ),
            }),
            _ => {}
        }

        let mut seen = HashSet::new();
        for (i, dep) in release.depends_on.iter().enumerate() {
            if !seen.insert(dep.as_str()) {
                result.warnings.push(format!(
                    "{prefix}.depends_on[{i}]: '{dep}' is listed more than once"
                ));
            }
        }

        if release.upgrade_on_change == Some(true) && !release.is_remote() {
            result.warnings.push(format!(
                "{prefix}.upgrade_on_change: local charts are upgraded by default"
            ));
        }

        if release.packaged.is_some() && release.is_remote() {
            result.warnings.push(format!(
                "{prefix}.packaged: ignored for remote chart '{}'",
                release.name
            ));
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
