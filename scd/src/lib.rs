//! Slowly changing dimension (type 2) merge engine.
//!
//! Reconciles a source snapshot table against an authoritative target table. Rows with new
//! business keys are appended, rows whose key vanished from the source are terminated in
//! place, and rows whose comparable attributes changed are appended as a new version while
//! the previous version is kept for history. Status and effective dates are stamped from a
//! [`registry::VersionRegistry`] loaded once per run.
//!
//! The entry point is [`merge::MergeExecutor`], which drives introspection, archival and the
//! three classification phases against a [`store::TableStore`] and a
//! [`store::ControlStore`].

pub mod archive;
pub mod classify;
pub mod error;
pub mod failpoints;
mod macros;
pub mod merge;
pub mod migrations;
pub mod registry;
pub mod schema;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
