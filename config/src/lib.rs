//! Configuration types and loading for the merger.
//!
//! Holds the connection settings for the backing Postgres store, the description of a single
//! merge run and the layered loader that assembles them from files and environment variables.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
