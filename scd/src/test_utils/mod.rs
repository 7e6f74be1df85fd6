//! Helpers shared by unit and integration tests.
//!
//! - [`fixtures`] builds the customer dimension used across tests, its registry and config.
//! - [`faulty_store`] wraps a store to record calls and inject store errors.
//! - [`failpoints`] configures `fail` points for the duration of a test.
//! - [`database`] creates a throwaway Postgres database per test.

pub mod database;
pub mod failpoints;
pub mod faulty_store;
pub mod fixtures;
