//! Column introspection and source to target column reconciliation.

mod introspect;
mod mapping;

pub use introspect::*;
pub use mapping::*;
