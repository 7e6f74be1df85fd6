use std::future::Future;

use crate::classify::StatusFilter;
use crate::error::ScdResult;
use crate::registry::VersionRegistry;
use crate::schema::StoredColumnMapping;
use crate::types::{Cell, ColumnSchema, DatasetRow, TableName};

/// Schema holding the control tables.
pub const CONTROL_SCHEMA: &str = "table_registry";

/// Control table with one row per change category.
pub const VERSION_REGISTRY_TABLE: &str = "quarter_detail";

/// Control table with stored source to target column mappings.
pub const COLUMN_MAPPING_TABLE: &str = "column_mapping";

/// A column being written, with the type values are cast to.
///
/// `typ` is `None` when the column's type is unknown, e.g. for passthrough columns, in which
/// case values are written uncast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteColumn {
    pub name: String,
    pub typ: Option<String>,
}

impl WriteColumn {
    pub fn new(name: impl Into<String>, typ: Option<String>) -> Self {
        Self {
            name: name.into(),
            typ,
        }
    }
}

impl From<&ColumnSchema> for WriteColumn {
    fn from(column: &ColumnSchema) -> Self {
        Self::new(column.name.clone(), Some(column.typ.clone()))
    }
}

/// In-place update of the rows matching a set of keys.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    /// Columns forming the key, in the order of each tuple of `keys`.
    pub key_columns: Vec<WriteColumn>,
    /// Key tuples of the rows to update. Null key values never match.
    pub keys: Vec<Vec<Cell>>,
    /// Columns to overwrite and their new values.
    pub assignments: Vec<(WriteColumn, Cell)>,
    /// When set, only rows this filter deems active are updated.
    pub active_only: Option<StatusFilter>,
}

/// Reads and mutates the tables taking part in a merge.
///
/// Every mutating method is its own transactional unit.
pub trait TableStore {
    /// Returns the columns of `table` in ordinal order, empty if the table does not exist.
    fn table_columns(
        &self,
        table: &TableName,
    ) -> impl Future<Output = ScdResult<Vec<ColumnSchema>>> + Send;

    fn table_exists(&self, table: &TableName) -> impl Future<Output = ScdResult<bool>> + Send;

    /// Reads every row of `table`, with values in the order of `columns`.
    fn read_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> impl Future<Output = ScdResult<Vec<DatasetRow>>> + Send;

    /// Renames `from` to `to` within the same schema.
    fn rename_table(
        &self,
        from: &TableName,
        to: &TableName,
    ) -> impl Future<Output = ScdResult<()>> + Send;

    /// Creates `to` as a full structural and data copy of `from`.
    fn copy_table(
        &self,
        from: &TableName,
        to: &TableName,
    ) -> impl Future<Output = ScdResult<()>> + Send;

    /// Renames `table` to `backup` and copies `backup` back to `table` as one atomic unit.
    ///
    /// On failure neither step is visible.
    fn snapshot_table(
        &self,
        table: &TableName,
        backup: &TableName,
    ) -> impl Future<Output = ScdResult<()>> + Send;

    /// Returns `true` when DDL can run inside a transaction, making
    /// [`TableStore::snapshot_table`] the preferred way to archive.
    fn supports_transactional_ddl(&self) -> bool;

    fn drop_table(&self, table: &TableName) -> impl Future<Output = ScdResult<()>> + Send;

    /// Creates `table` empty with the structure of `template`, unless it already exists.
    ///
    /// Returns `true` if the table was created.
    fn create_table_like(
        &self,
        table: &TableName,
        template: &TableName,
    ) -> impl Future<Output = ScdResult<bool>> + Send;

    /// Appends `rows`, each holding values in the order of `columns`.
    ///
    /// Returns the number of rows inserted.
    fn insert_rows(
        &self,
        table: &TableName,
        columns: &[WriteColumn],
        rows: Vec<DatasetRow>,
    ) -> impl Future<Output = ScdResult<u64>> + Send;

    /// Applies `update` and returns the number of rows changed.
    fn update_rows(
        &self,
        table: &TableName,
        update: &RowUpdate,
    ) -> impl Future<Output = ScdResult<u64>> + Send;
}

/// Reads and writes the control tables.
pub trait ControlStore {
    /// Loads the version registry.
    ///
    /// Fails with [`crate::error::ErrorKind::ConfigurationError`] when the registry table is
    /// missing or malformed. Completeness is checked by the caller.
    fn load_version_registry(&self) -> impl Future<Output = ScdResult<VersionRegistry>> + Send;

    /// Loads the stored mappings for one `(schema, source_table, target_table)` triple.
    ///
    /// Returns no mappings when the mapping table does not exist.
    fn load_column_mappings(
        &self,
        schema: &str,
        source_table: &str,
        target_table: &str,
    ) -> impl Future<Output = ScdResult<Vec<StoredColumnMapping>>> + Send;

    /// Inserts or overwrites mappings and returns how many were written.
    fn upsert_column_mappings(
        &self,
        mappings: &[StoredColumnMapping],
    ) -> impl Future<Output = ScdResult<u64>> + Send;
}
