//! Error types for the release orchestration system.
//!
//! This module provides the error hierarchy for every stage of an
//! orchestration run: configuration, dependency graph construction,
//! template expansion, level scheduling, and the helm collaborator.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the release orchestration system.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dependency graph errors.
    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    /// Template expansion errors outside of a scheduled task.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// A level failed while scheduling releases.
    #[error("{0}")]
    Schedule(#[from] ScheduleError),

    /// Helm command errors.
    #[error("Helm error: {0}")]
    Helm(#[from] HelmError),

    /// One or more releases could not be removed during teardown.
    #[error("teardown failed:\n{}", .failures.join("\n"))]
    Teardown {
        /// One message per failed uninstall, in attempt order.
        failures: Vec<String>,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override could not be applied.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvOverride {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Errors found while building the dependency graph.
///
/// All of these are detected before any release is deployed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Two releases share the same name.
    #[error("duplicate release name {name}")]
    DuplicateReleaseName {
        /// The duplicated name.
        name: String,
    },

    /// A release depends on a name that is not defined.
    #[error("release {release} depends on unknown release {dependency}")]
    UnknownDependency {
        /// Release declaring the dependency.
        release: String,
        /// The undefined dependency.
        dependency: String,
    },

    /// The dependency relation contains a cycle.
    #[error("cycle detected in release dependencies involving {node}")]
    DependencyCycle {
        /// Release whose outgoing edge closed the cycle.
        node: String,
    },
}

/// Template expansion errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template references a variable missing from the environment.
    #[error("map has no entry for key {name:?}")]
    UnknownVariable {
        /// Name of the missing variable.
        name: String,
    },

    /// The template is syntactically invalid.
    #[error("malformed template {template:?}: {reason}")]
    Malformed {
        /// The offending template.
        template: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failures surfaced by the leveled scheduler.
///
/// Each variant names the release and level that failed.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A templated identity field of a release could not be expanded.
    #[error("cannot expand {field} {template:?} of release {release:?} (level {level}): {source}")]
    TemplateExpansion {
        /// Raw release name.
        release: String,
        /// Level the release belongs to.
        level: usize,
        /// Field being expanded.
        field: &'static str,
        /// The template text.
        template: String,
        /// Underlying expansion error.
        #[source]
        source: TemplateError,
    },

    /// The deploy collaborator failed for a release.
    #[error("deploying {release:?} (level {level}): {source}")]
    Deploy {
        /// Expanded release name.
        release: String,
        /// Level the release belongs to.
        level: usize,
        /// Underlying deploy error.
        #[source]
        source: Box<ReleaseError>,
    },

    /// A deploy task panicked or was cancelled by the runtime.
    #[error("deploy task for {release:?} (level {level}) did not complete: {message}")]
    TaskAborted {
        /// Raw release name.
        release: String,
        /// Level the release belongs to.
        level: usize,
        /// Join error description.
        message: String,
    },

    /// A release listed in a level has no configuration entry.
    #[error("release {release:?} is scheduled but not defined")]
    MissingRelease {
        /// Name that failed to resolve.
        release: String,
    },
}

/// Errors from invoking the helm binary.
#[derive(Debug, Error)]
pub enum HelmError {
    /// The helm process could not be started.
    #[error("failed to start {program}: {message}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// OS error description.
        message: String,
    },

    /// Helm exited unsuccessfully.
    #[error("helm {args} exited with code {code:?}: {stderr}")]
    CommandFailed {
        /// Space-joined arguments.
        args: String,
        /// Exit code, if the process was not killed by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The release never became visible after install/upgrade.
    #[error("release {release} not visible after install: {message}")]
    NotConfirmed {
        /// Release name.
        release: String,
        /// Last error observed.
        message: String,
    },

    /// A local chart could not be packaged into an archive.
    #[error("cannot package chart: {message}")]
    Package {
        /// Description of the failure.
        message: String,
    },

    /// The overrides values file could not be written.
    #[error("cannot create overrides values file: {message}")]
    Overrides {
        /// Description of the failure.
        message: String,
    },
}

/// Result type alias for release orchestration operations.
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Helm(HelmError::Spawn { .. } | HelmError::CommandFailed { .. })
        )
    }

    /// Returns true if the error was raised before any deployment side effect.
    #[must_use]
    pub const fn is_pre_deploy(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl HelmError {
    /// Creates a command failure error.
    #[must_use]
    pub fn command_failed(args: &[String], code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            args: args.join(" "),
            code,
            stderr: stderr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_messages() {
        let err = GraphError::DuplicateReleaseName { name: String::from("a") };
        assert_eq!(err.to_string(), "duplicate release name a");

        let err = GraphError::UnknownDependency {
            release: String::from("a"),
            dependency: String::from("zeta"),
        };
        let msg = err.to_string();
        assert!(msg.contains("a") && msg.contains("zeta"));

        let err = GraphError::DependencyCycle { node: String::from("b") };
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_schedule_error_names_release_and_level() {
        let err = ScheduleError::Deploy {
            release: String::from("db"),
            level: 2,
            source: Box::new(ReleaseError::internal("boom")),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"db\""));
        assert!(msg.contains("level 2"));
        assert!(msg.contains("boom"));
    }

    #[test]
    fn test_retryable() {
        let err = ReleaseError::Helm(HelmError::command_failed(&[String::from("get")], Some(1), ""));
        assert!(err.is_retryable());
        assert!(!ReleaseError::internal("x").is_retryable());
    }

    #[test]
    fn test_teardown_lists_every_failure() {
        let err = ReleaseError::Teardown {
            failures: vec![String::from("api: gone"), String::from("db: locked")],
        };
        assert_eq!(err.to_string(), "teardown failed:\napi: gone\ndb: locked");
        assert!(!err.is_pre_deploy());
    }

    #[test]
    fn test_pre_deploy() {
        let err = ReleaseError::from(GraphError::DependencyCycle { node: String::from("a") });
        assert!(err.is_pre_deploy());
    }
}
