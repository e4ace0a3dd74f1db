// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is flagged
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are flagged
#![warn(unused_variables)]            // Unused variables are flagged
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Releasegraph
//!
//! Dependency-ordered, level-by-level deployment of inter-dependent Helm releases.
//!
//! ## Overview
//!
//! Each release may declare the releases it depends on. Releasegraph:
//!
//! - Validates the dependency relation (unique names, known targets, no cycles)
//! - Partitions releases into levels so every dependency sits in an earlier level
//! - Deploys one level at a time with a bounded number of concurrent releases
//! - Stops at the first failing level and reports the failing release
//!
//! ## Architecture
//!
//! 1. **Graph**: [`graph::DependencyGraph`] validates the releases
//! 2. **Levels**: [`graph::LevelGroups`] assigns each release a level
//! 3. **Scheduler**: [`scheduler::LeveledScheduler`] runs levels through a
//!    [`deployer::ReleaseDeployer`]
//! 4. **Orchestrator**: [`orchestrator::Orchestrator`] ties the run together
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`template`]: `{{.NAME}}` expansion of release identity fields
//! - [`graph`]: Dependency graph and level assignment
//! - [`scheduler`]: Leveled, bounded-concurrency execution
//! - [`deployer`]: Deploy collaborator trait and the helm implementation
//! - [`orchestrator`]: One complete deployment run
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! namespace: apps
//! concurrency: 2
//!
//! releases:
//!   - name: db
//!     remote_chart: bitnami/postgresql
//!   - name: api
//!     chart_path: charts/api
//!     depends_on: [db]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod deployer;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod scheduler;
pub mod template;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, DeployConfig, ReleaseConfig};
pub use deployer::{HelmDeployer, ReleaseDeployer};
pub use error::{ReleaseError, Result};
pub use graph::{DependencyGraph, LevelGroups};
pub use orchestrator::{DeploymentSummary, Orchestrator};
pub use scheduler::{AggregateResult, DeployOutcome, LeveledScheduler};
