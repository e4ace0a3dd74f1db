//! Leveled deployment scheduling.
//!
//! Consumes [`crate::graph::LevelGroups`] and drives one deploy task per
//! release, level by level, merging outcomes into an [`AggregateResult`].

mod leveled;
mod outcome;

pub use leveled::LeveledScheduler;
pub use outcome::{AggregateResult, DeployOutcome};
