//! CLI module for the releasegraph deployment tool.
//!
//! This module provides the command-line interface for validating,
//! planning, deploying and removing release graphs.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
