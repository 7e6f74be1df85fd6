use std::fmt;

use crate::types::Cell;

/// One logical record, values ordered like the columns of the [`Dataset`] holding it.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    values: Vec<Cell>,
}

impl DatasetRow {
    pub fn new(values: Vec<Cell>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<Cell> {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<Cell> {
        self.values
    }

    /// Returns the value at `index`, or [`Cell::Null`] when the row is shorter.
    pub fn get(&self, index: usize) -> &Cell {
        self.values.get(index).unwrap_or(&Cell::Null)
    }
}

/// A table snapshot: column names plus rows in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<DatasetRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DatasetRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of `column`, compared exactly.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Returns `row`'s value for `column`, if the column exists.
    pub fn value<'a>(&self, row: &'a DatasetRow, column: &str) -> Option<&'a Cell> {
        self.column_index(column).map(|index| row.get(index))
    }
}

/// Outcome of classifying one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Key absent from the target.
    New,
    /// Key present in both, with at least one compared value differing from every active
    /// target version.
    Changed,
    /// Active target row whose key vanished from the source.
    Terminated,
    /// Key present in both without a difference, or only present as inactive target rows.
    Unchanged,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::New => "new",
            Classification::Changed => "changed",
            Classification::Terminated => "terminated",
            Classification::Unchanged => "unchanged",
        };

        f.write_str(name)
    }
}

/// A row tagged with its classification.
///
/// New, changed and unchanged records carry a source row in source column order.
/// Terminated records carry the target row.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub classification: Classification,
    pub row: DatasetRow,
}

impl ChangeRecord {
    pub fn new(classification: Classification, row: DatasetRow) -> Self {
        Self {
            classification,
            row,
        }
    }
}
