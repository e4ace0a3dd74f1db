//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{DeployConfig, ValidationResult};
use crate::graph::LevelGroups;
use crate::orchestrator::DeploymentSummary;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Release row for the plan table.
#[derive(Tabled)]
struct LevelRow {
    #[tabled(rename = "Level")]
    level: usize,
    #[tabled(rename = "Release")]
    release: String,
    #[tabled(rename = "Chart")]
    chart: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the deployment levels for display.
    #[must_use]
    pub fn format_plan(&self, levels: &LevelGroups, config: &DeployConfig) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&PlanJson {
                concurrency: config.concurrency.to_string(),
                levels,
            })
            .unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(levels, config),
        }
    }

    fn format_plan_text(levels: &LevelGroups, config: &DeployConfig) -> String {
        if levels.is_empty() {
            return format!("{} No releases to deploy.\n", "✓".green());
        }

        let mut output = String::new();
        let _ = write!(
            output,
            "\nDeployment Plan\n   {} releases in {} levels (concurrency: {})\n\n",
            levels.release_count(),
            levels.len(),
            config.concurrency
        );

        let rows: Vec<LevelRow> = levels
            .iter()
            .flat_map(|(level, names)| names.iter().map(move |name| (level, name)))
            .map(|(level, name)| {
                let release = config.release(name);
                LevelRow {
                    level,
                    release: name.clone(),
                    chart: release
                        .and_then(|r| r.chart_source())
                        .map_or_else(String::new, |c| Self::truncate(c, 40)),
                    namespace: release
                        .and_then(|r| r.namespace.clone())
                        .or_else(|| config.namespace.clone())
                        .unwrap_or_default(),
                    depends_on: release.map_or_else(String::new, |r| r.depends_on.join(", ")),
                }
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');
        output
    }

    /// Formats a deployment summary.
    #[must_use]
    pub fn format_summary(&self, summary: &DeploymentSummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Deployment complete\n\n", "✓".green());
                let _ = writeln!(output, "   Run: {}", summary.run_id);
                let _ = writeln!(
                    output,
                    "   Releases: {} ({} deployed, {} skipped)",
                    summary.release_count,
                    summary.result.deployed - summary.result.skipped,
                    summary.result.skipped
                );
                let _ = writeln!(output, "   Levels: {}", summary.level_count);
                let _ = writeln!(
                    output,
                    "   Duration: {}ms",
                    summary.duration().num_milliseconds()
                );

                if !summary.result.namespaces.is_empty() {
                    let _ = writeln!(output, "   Namespaces: {}", summary.namespaces().join(", "));
                }

                if !summary.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &summary.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats a validation outcome.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        levels: &LevelGroups,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ValidationJson {
                valid: result.is_valid(),
                releases: levels.release_count(),
                levels: levels.len(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: &result.warnings,
            })
            .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());
                let _ = writeln!(
                    output,
                    "   {} releases in {} levels",
                    levels.release_count(),
                    levels.len()
                );
                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats the list of removed releases.
    #[must_use]
    pub fn format_teardown(&self, removed: &[String]) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&serde_json::json!({ "removed": removed }))
                    .unwrap_or_default()
            }
            OutputFormat::Text => {
                if removed.is_empty() {
                    return String::from("No releases to remove.\n");
                }
                let mut output = String::new();
                for name in removed {
                    let _ = writeln!(output, "   {} {name}", "-".red());
                }
                let _ = write!(output, "\n{} releases removed.\n", removed.len());
                output
            }
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(Serialize)]
struct PlanJson<'a> {
    concurrency: String,
    levels: &'a LevelGroups,
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    valid: bool,
    releases: usize,
    levels: usize,
    errors: Vec<String>,
    warnings: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReleaseConfig;
    use crate::graph::DependencyGraph;

    fn fixture() -> (LevelGroups, DeployConfig) {
        let mut config: DeployConfig = serde_yaml::from_str("namespace: apps").expect("config");
        for (name, deps) in [("api", vec!["db"]), ("db", vec![])] {
            let mut r = ReleaseConfig::new(name, &deps);
            r.chart_path = Some(format!("charts/{name}"));
            config.releases.push(r);
        }
        let graph = DependencyGraph::build(&config.releases).expect("graph");
        (LevelGroups::assign(&graph), config)
    }

    #[test]
    fn test_plan_text_lists_releases() {
        colored::control::set_override(false);
        let (levels, config) = fixture();
        let out = OutputFormatter::new(OutputFormat::Text).format_plan(&levels, &config);

        assert!(out.contains("2 releases in 2 levels"));
        assert!(out.contains("charts/db"));
        assert!(out.contains("apps"));
    }

    #[test]
    fn test_plan_json() {
        let (levels, config) = fixture();
        let out = OutputFormatter::new(OutputFormat::Json).format_plan(&levels, &config);
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");

        assert_eq!(value["concurrency"], "1");
        assert_eq!(value["levels"]["0"][0], "db");
        assert_eq!(value["levels"]["1"][0], "api");
    }

    #[test]
    fn test_teardown_json() {
        let out = OutputFormatter::new(OutputFormat::Json)
            .format_teardown(&[String::from("api"), String::from("db")]);
        let value: serde_json::Value = serde_json::from_str(&out).expect("json");
        assert_eq!(value["removed"][1], "db");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a-very-long-chart", 8), "a-ver...");
    }
}
