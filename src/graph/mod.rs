//! Release dependency graph.
//!
//! Builds the validated graph from a release list and partitions it into
//! dependency levels for the scheduler.

mod builder;
mod levels;

pub use builder::{DependencyGraph, ReleaseNode};
pub use levels::LevelGroups;
