//! Storage collaborators of the merge engine.
//!
//! [`TableStore`] reads and mutates the source, target and backup tables. [`ControlStore`]
//! reads the version registry and the stored column mappings. Both are implemented by
//! [`PostgresStore`] and by the in-memory [`MemoryStore`].

mod base;
mod memory;
mod postgres;

pub use base::*;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
