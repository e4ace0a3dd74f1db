//! Configuration module for the release orchestration system.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `releasegraph.yaml`
//! - Environment overrides and `.env` loading
//! - Validation of per-release settings

mod spec;
mod parser;
mod validator;

pub use spec::{
    BuildArtifact, Concurrency, DeployConfig, HelmConfig, HelmFlags, HelmPackaged, ReleaseConfig,
};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_CONCURRENCY, ENV_KUBE_CONTEXT, ENV_NAMESPACE,
    find_config_file,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
