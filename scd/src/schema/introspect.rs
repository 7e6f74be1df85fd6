use std::collections::BTreeMap;

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::store::TableStore;
use crate::types::{ColumnSchema, TableName};

/// Columns of one table in ordinal order, searchable without regard to case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    table: TableName,
    columns: Vec<ColumnSchema>,
}

impl TableColumns {
    pub fn new(table: TableName, columns: Vec<ColumnSchema>) -> Self {
        Self { table, columns }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Returns the canonical column names in ordinal order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Finds a column by name.
    ///
    /// An exact match wins. Otherwise the first column, in ordinal order, whose name equals
    /// `name` ignoring ASCII case is returned.
    pub fn find(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|column| column.name.eq_ignore_ascii_case(name))
            })
    }

    /// Returns the mapping from lowercased name to canonical name.
    ///
    /// When two columns only differ by case, the first one in ordinal order is kept.
    pub fn name_mapping(&self) -> BTreeMap<String, String> {
        let mut mapping = BTreeMap::new();
        for column in &self.columns {
            mapping
                .entry(column.name.to_lowercase())
                .or_insert_with(|| column.name.clone());
        }

        mapping
    }
}

/// Reads the columns of `table`.
///
/// Fails with [`ErrorKind::NotFound`] when the table does not exist or exposes no columns.
pub async fn list_columns<S>(store: &S, table: &TableName) -> ScdResult<TableColumns>
where
    S: TableStore,
{
    let columns = store.table_columns(table).await?;
    if columns.is_empty() {
        bail!(
            ErrorKind::NotFound,
            "Table not found",
            format!("table `{table}` does not exist or has no columns")
        );
    }

    debug!(table = %table, columns = columns.len(), "introspected table columns");

    Ok(TableColumns::new(table.clone(), columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Cell;

    fn columns() -> TableColumns {
        TableColumns::new(
            TableName::new("public", "customer"),
            vec![
                ColumnSchema::new("Id", "integer", "integer", false),
                ColumnSchema::new("NAME", "text", "text", true),
                ColumnSchema::new("name", "text", "text", true),
            ],
        )
    }

    #[test]
    fn find_prefers_exact_match() {
        let columns = columns();

        assert_eq!(columns.find("id").unwrap().name, "Id");
        assert_eq!(columns.find("name").unwrap().name, "name");
        assert_eq!(columns.find("Name").unwrap().name, "NAME");
        assert!(columns.find("missing").is_none());
    }

    #[test]
    fn name_mapping_lowercases_keys() {
        let mapping = columns().name_mapping();

        assert_eq!(mapping.get("id").map(String::as_str), Some("Id"));
        assert_eq!(mapping.get("name").map(String::as_str), Some("NAME"));
        assert_eq!(mapping.len(), 2);
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let store = MemoryStore::new();
        store
            .create_table(
                TableName::new("public", "customer"),
                vec![ColumnSchema::new("id", "integer", "integer", false)],
                vec![vec![Cell::I32(1)]],
            )
            .await;

        let found = list_columns(&store, &TableName::new("public", "customer"))
            .await
            .unwrap();
        assert_eq!(found.names(), vec!["id"]);

        let err = list_columns(&store, &TableName::new("public", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
