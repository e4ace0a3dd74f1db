//! Configuration parser for loading deployment configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, ReleaseError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{Concurrency, DeployConfig};

/// Environment variable overriding the default namespace.
pub const ENV_NAMESPACE: &str = "RELEASEGRAPH_NAMESPACE";

/// Environment variable overriding the concurrency setting.
pub const ENV_CONCURRENCY: &str = "RELEASEGRAPH_CONCURRENCY";

/// Environment variable overriding the kube context.
pub const ENV_KUBE_CONTEXT: &str = "RELEASEGRAPH_KUBE_CONTEXT";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ReleaseError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ReleaseError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| {
            ReleaseError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!("Parsed configuration with {} releases", config.releases.len());
        Ok(config)
    }

    /// Loads configuration and applies environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// override value is invalid.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_overrides(&mut config, |name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies overrides looked up through `lookup`.
    fn apply_overrides(
        config: &mut DeployConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(namespace) = lookup(ENV_NAMESPACE) {
            debug!("Overriding namespace from environment");
            config.namespace = Some(namespace);
        }

        if let Some(value) = lookup(ENV_CONCURRENCY) {
            debug!("Overriding concurrency from environment");
            let parsed = value.trim().parse::<u32>().map_err(|_| {
                ReleaseError::Config(ConfigError::InvalidEnvOverride {
                    name: String::from(ENV_CONCURRENCY),
                    value: value.clone(),
                })
            })?;
            config.concurrency = Concurrency::from(parsed);
        }

        if let Some(context) = lookup(ENV_KUBE_CONTEXT) {
            debug!("Overriding helm.kube_context from environment");
            config.helm.kube_context = Some(context);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ReleaseError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    "releasegraph.yaml",
    "releasegraph.yml",
    "releases.yaml",
];

/// Finds the configuration file in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ReleaseError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
releases:
  - name: app
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse");
        assert_eq!(config.releases.len(), 1);
        assert_eq!(config.releases[0].name, "app");
        assert!(config.concurrency.is_sequential());
        assert_eq!(config.helm.binary, "helm");
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
namespace: apps
concurrency: 0
helm:
  binary: /usr/local/bin/helm
  kube_context: kind-dev
  flags:
    install: ["--atomic"]
artifacts:
  - image: web
    tag: "web:abc123"
releases:
  - name: "{{.PREFIX}}-db"
    chart_path: charts/db
    namespace: data
  - name: web
    remote_chart: bitnami/nginx
    version: "15.0.0"
    depends_on: ["{{.PREFIX}}-db"]
    set_values:
      image.tag: latest
    overrides:
      replicas: 2
    upgrade_on_change: true
"#;
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("parse");
        assert_eq!(config.namespace.as_deref(), Some("apps"));
        assert_eq!(config.concurrency, Concurrency::Unlimited);
        assert_eq!(config.helm.flags.install, vec![String::from("--atomic")]);
        assert_eq!(config.artifacts.len(), 1);
        assert_eq!(config.releases[1].depends_on, vec![String::from("{{.PREFIX}}-db")]);
        assert_eq!(config.releases[1].upgrade_on_change, Some(true));
        assert_eq!(config.releases[1].overrides.len(), 1);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = ConfigParser::new().parse_yaml("releases: [", None);
        assert!(matches!(
            result,
            Err(ReleaseError::Config(ConfigError::ParseError { .. }))
        ));
    }

    #[test]
    fn test_load_file_and_find() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("releasegraph.yaml");
        std::fs::write(&path, "releases:\n  - name: a\n").expect("write");

        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).expect("mkdir");
        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, path);

        let config = ConfigParser::new().load_file(&found).expect("load");
        assert_eq!(config.release_names(), vec!["a"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().expect("temp dir");
        let result = ConfigParser::new().load_file(dir.path().join("nope.yaml"));
        assert!(matches!(
            result,
            Err(ReleaseError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = ConfigParser::new()
            .parse_yaml("releases: []", None)
            .expect("parse");

        ConfigParser::apply_overrides(&mut config, |name| match name {
            ENV_NAMESPACE => Some(String::from("ci")),
            ENV_CONCURRENCY => Some(String::from("3")),
            ENV_KUBE_CONTEXT => Some(String::from("prod")),
            _ => None,
        })
        .expect("overrides");

        assert_eq!(config.namespace.as_deref(), Some("ci"));
        assert_eq!(config.concurrency.limit(), Some(3));
        assert_eq!(config.helm.kube_context.as_deref(), Some("prod"));
    }

    #[test]
    fn test_apply_invalid_concurrency_override() {
        let mut config = ConfigParser::new()
            .parse_yaml("releases: []", None)
            .expect("parse");

        let result = ConfigParser::apply_overrides(&mut config, |name| {
            (name == ENV_CONCURRENCY).then(|| String::from("many"))
        });
        assert!(result.is_err());
    }
}
