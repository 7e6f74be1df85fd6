//! Values, rows and classification results exchanged between the store and the merge
//! phases.

mod cell;
mod row;

pub use cell::*;
pub use row::*;

pub use postgres::schema::{ColumnSchema, TableName};
