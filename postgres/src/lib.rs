//! Postgres building blocks shared by the merge engine and the merger binary.
//!
//! Holds table naming with identifier quoting, catalog lookups for column metadata, pool
//! construction and, behind the `test-utils` feature, helpers for throwaway test databases.

pub mod db;
pub mod schema;
#[cfg(feature = "test-utils")]
pub mod sqlx;
