use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, ScdResult};
use crate::registry::VersionRegistry;
use crate::schema::StoredColumnMapping;
use crate::scd_error;
use crate::store::{ControlStore, RowUpdate, TableStore, WriteColumn};
use crate::types::{ColumnSchema, DatasetRow, TableName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMethod {
    TableColumns,
    TableExists,
    ReadRows,
    RenameTable,
    CopyTable,
    SnapshotTable,
    DropTable,
    CreateTableLike,
    InsertRows,
    UpdateRows,
    LoadVersionRegistry,
    LoadColumnMappings,
    UpsertColumnMappings,
}

#[derive(Debug, Clone)]
struct Fault {
    method: StoreMethod,
    call: usize,
    kind: ErrorKind,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<StoreMethod>,
    faults: Vec<Fault>,
}

/// Store wrapper that records every call and fails chosen ones.
///
/// Failures are injected before the wrapped store is called, so a failed call has no
/// effect on the data.
#[derive(Debug, Clone)]
pub struct FaultyStore<S> {
    store: S,
    inner: Arc<Mutex<Inner>>,
}

impl<S> FaultyStore<S> {
    pub fn wrap(store: S) -> Self {
        Self {
            store,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn get_inner(&self) -> &S {
        &self.store
    }

    /// Fails the first call to `method` with an error of `kind`.
    pub async fn fail_on(&self, method: StoreMethod, kind: ErrorKind) {
        self.fail_on_call(method, 0, kind).await;
    }

    /// Fails the `call`-th call to `method`, counting from zero.
    pub async fn fail_on_call(&self, method: StoreMethod, call: usize, kind: ErrorKind) {
        let mut inner = self.inner.lock().await;
        inner.faults.push(Fault { method, call, kind });
    }

    /// Returns every call made so far, in order.
    pub async fn calls(&self) -> Vec<StoreMethod> {
        self.inner.lock().await.calls.clone()
    }

    /// Returns how many times `method` was called.
    pub async fn call_count(&self, method: StoreMethod) -> usize {
        self.inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| **call == method)
            .count()
    }

    async fn record(&self, method: StoreMethod) -> ScdResult<()> {
        let mut inner = self.inner.lock().await;
        let call = inner.calls.iter().filter(|call| **call == method).count();
        inner.calls.push(method);

        let fault = inner
            .faults
            .iter()
            .find(|fault| fault.method == method && fault.call == call);
        if let Some(fault) = fault {
            return Err(scd_error!(
                fault.kind,
                "Injected store failure",
                format!("call {call} to {method:?} was set up to fail")
            ));
        }

        Ok(())
    }
}

impl<S> TableStore for FaultyStore<S>
where
    S: TableStore + Send + Sync,
{
    async fn table_columns(&self, table: &TableName) -> ScdResult<Vec<ColumnSchema>> {
        self.record(StoreMethod::TableColumns).await?;
        self.store.table_columns(table).await
    }

    async fn table_exists(&self, table: &TableName) -> ScdResult<bool> {
        self.record(StoreMethod::TableExists).await?;
        self.store.table_exists(table).await
    }

    async fn read_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> ScdResult<Vec<DatasetRow>> {
        self.record(StoreMethod::ReadRows).await?;
        self.store.read_rows(table, columns).await
    }

    async fn rename_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        self.record(StoreMethod::RenameTable).await?;
        self.store.rename_table(from, to).await
    }

    async fn copy_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        self.record(StoreMethod::CopyTable).await?;
        self.store.copy_table(from, to).await
    }

    async fn snapshot_table(&self, table: &TableName, backup: &TableName) -> ScdResult<()> {
        self.record(StoreMethod::SnapshotTable).await?;
        self.store.snapshot_table(table, backup).await
    }

    fn supports_transactional_ddl(&self) -> bool {
        self.store.supports_transactional_ddl()
    }

    async fn drop_table(&self, table: &TableName) -> ScdResult<()> {
        self.record(StoreMethod::DropTable).await?;
        self.store.drop_table(table).await
    }

    async fn create_table_like(&self, table: &TableName, template: &TableName) -> ScdResult<bool> {
        self.record(StoreMethod::CreateTableLike).await?;
        self.store.create_table_like(table, template).await
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[WriteColumn],
        rows: Vec<DatasetRow>,
    ) -> ScdResult<u64> {
        self.record(StoreMethod::InsertRows).await?;
        self.store.insert_rows(table, columns, rows).await
    }

    async fn update_rows(&self, table: &TableName, update: &RowUpdate) -> ScdResult<u64> {
        self.record(StoreMethod::UpdateRows).await?;
        self.store.update_rows(table, update).await
    }
}

impl<S> ControlStore for FaultyStore<S>
where
    S: ControlStore + Send + Sync,
{
    async fn load_version_registry(&self) -> ScdResult<VersionRegistry> {
        self.record(StoreMethod::LoadVersionRegistry).await?;
        self.store.load_version_registry().await
    }

    async fn load_column_mappings(
        &self,
        schema: &str,
        source_table: &str,
        target_table: &str,
    ) -> ScdResult<Vec<StoredColumnMapping>> {
        self.record(StoreMethod::LoadColumnMappings).await?;
        self.store
            .load_column_mappings(schema, source_table, target_table)
            .await
    }

    async fn upsert_column_mappings(&self, mappings: &[StoredColumnMapping]) -> ScdResult<u64> {
        self.record(StoreMethod::UpsertColumnMappings).await?;
        self.store.upsert_column_mappings(mappings).await
    }
}
