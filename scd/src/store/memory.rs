use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::failpoints::{ARCHIVE_AFTER_RENAME, scd_fail_point};
use crate::registry::{VersionDescriptor, VersionRegistry};
use crate::schema::StoredColumnMapping;
use crate::store::{ControlStore, RowUpdate, TableStore, WriteColumn};
use crate::types::{Cell, ColumnSchema, Dataset, DatasetRow, TableName};

/// One table held in memory.
#[derive(Debug, Clone)]
struct MemoryTable {
    columns: Vec<ColumnSchema>,
    rows: Vec<Vec<Cell>>,
}

impl MemoryTable {
    fn column_index(&self, table: &TableName, column: &str) -> ScdResult<usize> {
        match self.columns.iter().position(|schema| schema.name == column) {
            Some(index) => Ok(index),
            None => bail!(
                ErrorKind::StoreError,
                "Column does not exist",
                format!("column `{column}` of relation `{table}` does not exist")
            ),
        }
    }

    fn as_dataset(&self) -> Dataset {
        Dataset::new(
            self.columns.iter().map(|column| column.name.clone()).collect(),
            self.rows.iter().cloned().map(DatasetRow::new).collect(),
        )
    }
}

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<TableName, MemoryTable>,
    registry: Vec<VersionDescriptor>,
    column_mappings: Vec<StoredColumnMapping>,
}

impl Inner {
    fn table(&self, table: &TableName) -> ScdResult<&MemoryTable> {
        match self.tables.get(table) {
            Some(memory_table) => Ok(memory_table),
            None => bail!(
                ErrorKind::NotFound,
                "Table not found",
                format!("relation `{table}` does not exist")
            ),
        }
    }

    fn table_mut(&mut self, table: &TableName) -> ScdResult<&mut MemoryTable> {
        match self.tables.get_mut(table) {
            Some(memory_table) => Ok(memory_table),
            None => bail!(
                ErrorKind::NotFound,
                "Table not found",
                format!("relation `{table}` does not exist")
            ),
        }
    }

    fn ensure_absent(&self, table: &TableName) -> ScdResult<()> {
        if self.tables.contains_key(table) {
            bail!(
                ErrorKind::StoreError,
                "Table already exists",
                format!("relation `{table}` already exists")
            );
        }

        Ok(())
    }

    fn rename(&mut self, from: &TableName, to: &TableName) -> ScdResult<()> {
        self.ensure_absent(to)?;
        let Some(memory_table) = self.tables.remove(from) else {
            bail!(
                ErrorKind::NotFound,
                "Table not found",
                format!("relation `{from}` does not exist")
            );
        };
        self.tables.insert(to.clone(), memory_table);

        Ok(())
    }

    fn copy(&mut self, from: &TableName, to: &TableName) -> ScdResult<()> {
        self.ensure_absent(to)?;
        let copy = self.table(from)?.clone();
        self.tables.insert(to.clone(), copy);

        Ok(())
    }
}

/// In-memory table and control store.
///
/// Tables behave like Postgres relations closely enough to run whole merges in tests:
/// missing tables are [`ErrorKind::NotFound`], writes to unknown columns and name clashes
/// are [`ErrorKind::StoreError`]. Values are stored as given, without casts.
///
/// DDL is reported as non-transactional unless enabled with
/// [`MemoryStore::set_transactional_ddl`], so archival takes the two-step path by default.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    transactional_ddl: bool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            transactional_ddl: false,
        }
    }

    /// Returns a store sharing this one's data whose DDL is reported as transactional.
    pub fn set_transactional_ddl(mut self, enabled: bool) -> Self {
        self.transactional_ddl = enabled;
        self
    }

    /// Creates or replaces `table` with the given columns and rows.
    pub async fn create_table(
        &self,
        table: TableName,
        columns: Vec<ColumnSchema>,
        rows: Vec<Vec<Cell>>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.tables.insert(table, MemoryTable { columns, rows });
    }

    /// Returns the full content of `table`, or `None` if it does not exist.
    pub async fn dataset(&self, table: &TableName) -> Option<Dataset> {
        let inner = self.inner.lock().await;
        inner.tables.get(table).map(MemoryTable::as_dataset)
    }

    /// Replaces the version registry.
    pub async fn set_version_registry(&self, descriptors: Vec<VersionDescriptor>) {
        let mut inner = self.inner.lock().await;
        inner.registry = descriptors;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns `true` when `row` holds `key` in `indexes`, comparing null-aware and never
/// matching nulls.
fn row_matches_key(row: &[Cell], indexes: &[usize], key: &[Cell]) -> bool {
    indexes.iter().zip(key).all(|(index, expected)| {
        let value = row.get(*index).unwrap_or(&Cell::Null);
        !value.is_null() && !expected.is_null() && !value.is_distinct_from(expected)
    })
}

impl TableStore for MemoryStore {
    async fn table_columns(&self, table: &TableName) -> ScdResult<Vec<ColumnSchema>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .tables
            .get(table)
            .map(|memory_table| memory_table.columns.clone())
            .unwrap_or_default())
    }

    async fn table_exists(&self, table: &TableName) -> ScdResult<bool> {
        let inner = self.inner.lock().await;

        Ok(inner.tables.contains_key(table))
    }

    async fn read_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> ScdResult<Vec<DatasetRow>> {
        let inner = self.inner.lock().await;
        let memory_table = inner.table(table)?;

        let indexes = columns
            .iter()
            .map(|column| memory_table.column_index(table, &column.name))
            .collect::<ScdResult<Vec<_>>>()?;

        let rows = memory_table
            .rows
            .iter()
            .map(|row| {
                DatasetRow::new(
                    indexes
                        .iter()
                        .map(|index| row.get(*index).cloned().unwrap_or(Cell::Null))
                        .collect(),
                )
            })
            .collect();

        Ok(rows)
    }

    async fn rename_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        let mut inner = self.inner.lock().await;
        inner.rename(from, to)
    }

    async fn copy_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        let mut inner = self.inner.lock().await;
        inner.copy(from, to)
    }

    async fn snapshot_table(&self, table: &TableName, backup: &TableName) -> ScdResult<()> {
        let mut inner = self.inner.lock().await;

        let saved = inner.tables.clone();
        let result = inner
            .rename(table, backup)
            .and_then(|_| scd_fail_point(ARCHIVE_AFTER_RENAME))
            .and_then(|_| inner.copy(backup, table));
        if result.is_err() {
            inner.tables = saved;
        }

        result
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.transactional_ddl
    }

    async fn drop_table(&self, table: &TableName) -> ScdResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.tables.remove(table).is_none() {
            bail!(
                ErrorKind::NotFound,
                "Table not found",
                format!("relation `{table}` does not exist")
            );
        }

        Ok(())
    }

    async fn create_table_like(&self, table: &TableName, template: &TableName) -> ScdResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.tables.contains_key(table) {
            return Ok(false);
        }

        let columns = inner.table(template)?.columns.clone();
        inner.tables.insert(
            table.clone(),
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );

        Ok(true)
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[WriteColumn],
        rows: Vec<DatasetRow>,
    ) -> ScdResult<u64> {
        let mut inner = self.inner.lock().await;
        let memory_table = inner.table_mut(table)?;

        let indexes = columns
            .iter()
            .map(|column| memory_table.column_index(table, &column.name))
            .collect::<ScdResult<Vec<_>>>()?;

        let width = memory_table.columns.len();
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            let mut values = vec![Cell::Null; width];
            for (index, value) in indexes.iter().zip(row.into_values()) {
                values[*index] = value;
            }
            inserted.push(values);
        }

        let count = inserted.len() as u64;
        memory_table.rows.extend(inserted);

        Ok(count)
    }

    async fn update_rows(&self, table: &TableName, update: &RowUpdate) -> ScdResult<u64> {
        let mut inner = self.inner.lock().await;
        let memory_table = inner.table_mut(table)?;

        let key_indexes = update
            .key_columns
            .iter()
            .map(|column| memory_table.column_index(table, &column.name))
            .collect::<ScdResult<Vec<_>>>()?;
        let assignment_indexes = update
            .assignments
            .iter()
            .map(|(column, _)| memory_table.column_index(table, &column.name))
            .collect::<ScdResult<Vec<_>>>()?;

        let dataset = memory_table.as_dataset();
        let mut updated = 0u64;
        for (position, row) in memory_table.rows.iter_mut().enumerate() {
            if let Some(status) = &update.active_only {
                if !status.is_active(&dataset, &dataset.rows()[position]) {
                    continue;
                }
            }

            if !update
                .keys
                .iter()
                .any(|key| row_matches_key(row, &key_indexes, key))
            {
                continue;
            }

            for (index, (_, value)) in assignment_indexes.iter().zip(&update.assignments) {
                row[*index] = value.clone();
            }
            updated += 1;
        }

        Ok(updated)
    }
}

impl ControlStore for MemoryStore {
    async fn load_version_registry(&self) -> ScdResult<VersionRegistry> {
        let inner = self.inner.lock().await;

        VersionRegistry::new(inner.registry.clone())
    }

    async fn load_column_mappings(
        &self,
        schema: &str,
        source_table: &str,
        target_table: &str,
    ) -> ScdResult<Vec<StoredColumnMapping>> {
        let inner = self.inner.lock().await;

        Ok(inner
            .column_mappings
            .iter()
            .filter(|mapping| {
                mapping.schema == schema
                    && mapping.source_table == source_table
                    && mapping.target_table == target_table
            })
            .cloned()
            .collect())
    }

    async fn upsert_column_mappings(&self, mappings: &[StoredColumnMapping]) -> ScdResult<u64> {
        let mut inner = self.inner.lock().await;

        for mapping in mappings {
            let existing = inner.column_mappings.iter_mut().find(|stored| {
                stored.schema == mapping.schema
                    && stored.source_table == mapping.source_table
                    && stored.target_table == mapping.target_table
                    && stored.source_column == mapping.source_column
            });

            match existing {
                Some(stored) => stored.target_column = mapping.target_column.clone(),
                None => inner.column_mappings.push(mapping.clone()),
            }
        }

        Ok(mappings.len() as u64)
    }
}
