//! Logging setup for the merger binary and the test suites.

pub mod tracing;

pub use tracing::{LogFlusher, TracingError, init_test_tracing, init_tracing};
