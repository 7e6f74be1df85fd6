use chrono::NaiveDate;
use config::shared::MergeConfig;

use crate::registry::{ChangeCategory, VersionDescriptor};
use crate::store::MemoryStore;
use crate::types::{Cell, ColumnSchema, TableName};

/// Status stamped on new rows.
pub const NEW_STATUS: &str = "1";

/// Status stamped on new versions of changed rows.
pub const CHANGED_STATUS: &str = "2";

/// Status stamped on terminated rows, equal to the default inactive status.
pub const DELETE_STATUS: &str = "0";

pub const VERSION_ID: &str = "2024Q2";

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("date is valid")
}

/// First day of the quarter new and changed versions start on.
pub fn quarter_start() -> NaiveDate {
    date(2024, 4, 1)
}

/// Last day of the previous quarter, the end date of terminated rows.
pub fn quarter_end() -> NaiveDate {
    date(2024, 3, 31)
}

/// One descriptor per change category, for the second quarter of 2024.
pub fn registry_descriptors() -> Vec<VersionDescriptor> {
    vec![
        VersionDescriptor {
            category: ChangeCategory::New,
            status_code: NEW_STATUS.to_owned(),
            effective_start_date: Some(quarter_start()),
            effective_end_date: None,
            version_id: Some(VERSION_ID.to_owned()),
        },
        VersionDescriptor {
            category: ChangeCategory::ChangeBasedNew,
            status_code: CHANGED_STATUS.to_owned(),
            effective_start_date: Some(quarter_start()),
            effective_end_date: None,
            version_id: Some(VERSION_ID.to_owned()),
        },
        VersionDescriptor {
            category: ChangeCategory::Delete,
            status_code: DELETE_STATUS.to_owned(),
            effective_start_date: None,
            effective_end_date: Some(quarter_end()),
            version_id: None,
        },
    ]
}

pub fn source_table(schema: &str) -> TableName {
    TableName::new(schema, "stg_customer")
}

pub fn target_table(schema: &str) -> TableName {
    TableName::new(schema, "customer")
}

/// Merge settings for the customer dimension keyed by `id`.
pub fn customer_merge_config(schema: &str) -> MergeConfig {
    MergeConfig::new(schema, "stg_customer", "customer", vec!["id".to_owned()])
}

/// Source columns: `id`, `name` and `city`.
pub fn source_columns() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("id", "integer", "integer", false),
        ColumnSchema::new("name", "text", "text", true),
        ColumnSchema::new("city", "text", "text", true),
    ]
}

/// Target columns: the source columns followed by the stamp columns.
pub fn target_columns() -> Vec<ColumnSchema> {
    let mut columns = source_columns();
    columns.extend([
        ColumnSchema::new("status", "text", "text", true),
        ColumnSchema::new("effective_start_date", "date", "date", true),
        ColumnSchema::new("effective_end_date", "date", "date", true),
        ColumnSchema::new("version_id", "text", "text", true),
    ]);
    columns
}

pub fn source_row(id: i32, name: &str, city: Option<&str>) -> Vec<Cell> {
    vec![Cell::I32(id), name.into(), city.into()]
}

/// A first quarter version of a customer with the given status.
pub fn target_row(id: i32, name: &str, city: Option<&str>, status: &str) -> Vec<Cell> {
    vec![
        Cell::I32(id),
        name.into(),
        city.into(),
        status.into(),
        date(2024, 1, 1).into(),
        Cell::Null,
        "2024Q1".into(),
    ]
}

/// Creates a memory store holding both customer tables and the registry.
pub async fn memory_store(
    schema: &str,
    source_rows: Vec<Vec<Cell>>,
    target_rows: Vec<Vec<Cell>>,
) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .create_table(source_table(schema), source_columns(), source_rows)
        .await;
    store
        .create_table(target_table(schema), target_columns(), target_rows)
        .await;
    store.set_version_registry(registry_descriptors()).await;

    store
}
