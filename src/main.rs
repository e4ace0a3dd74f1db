//! Releasegraph CLI entrypoint.
//!
//! This is the main entrypoint for the releasegraph command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use releasegraph::cli::{Cli, Commands, OutputFormatter};
use releasegraph::config::{
    Concurrency, ConfigParser, ConfigValidator, DeployConfig, find_config_file,
};
use releasegraph::deployer::HelmDeployer;
use releasegraph::error::Result;
use releasegraph::graph::{DependencyGraph, LevelGroups};
use releasegraph::orchestrator::Orchestrator;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings, &formatter),
        Commands::Plan => cmd_plan(cli.config.as_ref(), &formatter),
        Commands::Deploy {
            concurrency,
            kube_context,
        } => cmd_deploy(cli.config.as_ref(), concurrency, kube_context, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
    }
}

/// Validate configuration and dependency graph.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;

    let result = ConfigValidator::new().validate(&config)?;
    let graph = DependencyGraph::build(&config.releases)?;
    let levels = LevelGroups::assign(&graph);

    println!("{}", formatter.format_validation(&result, &levels, show_warnings));
    Ok(())
}

/// Show deployment levels.
fn cmd_plan(config_path: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let config = load_config(config_path)?;
    ConfigValidator::new().validate(&config)?;

    let graph = DependencyGraph::build(&config.releases)?;
    let levels = LevelGroups::assign(&graph);

    println!("{}", formatter.format_plan(&levels, &config));
    Ok(())
}

/// Deploy all releases.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    concurrency: Option<u32>,
    kube_context: Option<String>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(n) = concurrency {
        config.concurrency = Concurrency::from(n);
    }
    if kube_context.is_some() {
        config.helm.kube_context = kube_context;
    }
    ConfigValidator::new().validate(&config)?;

    let artifacts = config.artifacts.clone();
    let orchestrator = build_orchestrator(config);
    let summary = orchestrator.run(&artifacts).await?;

    println!("{}", formatter.format_summary(&summary));
    Ok(())
}

/// Uninstall all releases.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config = load_config(config_path)?;
    ConfigValidator::new().validate(&config)?;

    let orchestrator = build_orchestrator(config);
    let levels = orchestrator.plan()?;
    if levels.is_empty() {
        eprintln!("No releases to remove.");
        return Ok(());
    }

    eprintln!("The following releases will be uninstalled:");
    for (_, names) in levels.iter().rev() {
        for name in names {
            eprintln!("  - {name}");
        }
    }

    // Confirm
    if !auto_approve {
        eprint!("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "destroy" {
            eprintln!("Destruction cancelled.");
            return Ok(());
        }
    }

    let removed = orchestrator.teardown().await?;
    println!("{}", formatter.format_teardown(&removed));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads `.env` and the configuration with environment overrides.
fn load_config(config_path: Option<&PathBuf>) -> Result<DeployConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser =
        ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    info!("Loaded {} releases", config.releases.len());
    Ok(config)
}

/// Creates an orchestrator backed by the helm CLI.
fn build_orchestrator(config: DeployConfig) -> Orchestrator<HelmDeployer> {
    let deployer = HelmDeployer::new(config.helm.clone(), config.namespace.clone());
    Orchestrator::new(config, Arc::new(deployer))
}
