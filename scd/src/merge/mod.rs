//! The merge state machine.
//!
//! [`MergeExecutor::run`] introspects both tables into a [`MergePlan`], archives the
//! target, then applies the new, terminated and changed partitions in that order, each
//! against a fresh read of the tables.

mod executor;
mod phase;
mod plan;

pub use executor::{MergeExecutor, MergePreview};
pub use phase::{MergeCounts, MergeFailure, MergeOutcome, MergePhase};
pub use plan::{MergePlan, StampColumns};
