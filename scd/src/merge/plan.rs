use std::collections::HashSet;

use config::shared::{MergeConfig, StampColumnsConfig};
use tracing::debug;

use crate::bail;
use crate::classify::{BusinessKeySet, StatusFilter};
use crate::error::{ErrorKind, ScdResult};
use crate::registry::{VersionDescriptor, VersionRegistry};
use crate::schema::{ColumnMapping, TableColumns, list_columns};
use crate::store::{ControlStore, TableStore, WriteColumn};
use crate::types::{Cell, ChangeRecord, ColumnSchema, DatasetRow, NormalizedValue, TableName};

/// Target columns stamped from the version registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampColumns {
    pub status: ColumnSchema,
    pub effective_start_date: ColumnSchema,
    pub effective_end_date: ColumnSchema,
    pub version_id: ColumnSchema,
}

impl StampColumns {
    /// Resolves the configured stamp columns against the target, ignoring case.
    pub fn resolve(target: &TableColumns, config: &StampColumnsConfig) -> ScdResult<Self> {
        let find = |name: &str| match target.find(name) {
            Some(column) => Ok(column.clone()),
            None => bail!(
                ErrorKind::ConfigurationError,
                "Target table is missing a stamp column",
                format!("`{}` has no column `{name}`", target.table())
            ),
        };

        Ok(Self {
            status: find(&config.status)?,
            effective_start_date: find(&config.effective_start_date)?,
            effective_end_date: find(&config.effective_end_date)?,
            version_id: find(&config.version_id)?,
        })
    }

    fn columns(&self) -> [&ColumnSchema; 4] {
        [
            &self.status,
            &self.effective_start_date,
            &self.effective_end_date,
            &self.version_id,
        ]
    }

    /// Returns `true` if `name` is one of the stamp columns.
    pub fn contains(&self, name: &str) -> bool {
        self.columns().iter().any(|column| column.name == name)
    }

    fn write_columns(&self) -> impl Iterator<Item = WriteColumn> + '_ {
        self.columns().into_iter().map(|column| WriteColumn::from(column))
    }

    fn cells(descriptor: &VersionDescriptor) -> [Cell; 4] {
        [
            descriptor.status_cell(),
            descriptor.effective_start_date_cell(),
            descriptor.effective_end_date_cell(),
            descriptor.version_id_cell(),
        ]
    }
}

/// Everything a run needs, resolved once while introspecting and used unchanged by every
/// later phase.
#[derive(Debug, Clone)]
pub struct MergePlan {
    source: TableColumns,
    target: TableColumns,
    mapping: ColumnMapping,
    keys: BusinessKeySet,
    exclude_fields: Vec<String>,
    stamps: StampColumns,
    status: StatusFilter,
    registry: VersionRegistry,
}

impl MergePlan {
    /// Introspects both tables and resolves the configuration against them.
    ///
    /// Business keys and exclusions may name either source or target columns, in any case.
    /// Exclusions naming no mapped column are ignored.
    pub async fn resolve<S>(store: &S, config: &MergeConfig) -> ScdResult<MergePlan>
    where
        S: TableStore + ControlStore,
    {
        let source_table = TableName::new(&config.schema, &config.source_table);
        let target_table = TableName::new(&config.schema, &config.target_table);
        if source_table == target_table {
            bail!(
                ErrorKind::InvalidArgument,
                "Source and target are the same table",
                format!("`{source_table}` cannot be merged into itself")
            );
        }

        let source = list_columns(store, &source_table).await?;
        let target = list_columns(store, &target_table).await?;
        debug!(
            source = ?source.name_mapping(),
            target = ?target.name_mapping(),
            "introspected columns"
        );

        let stored = store
            .load_column_mappings(&config.schema, &config.source_table, &config.target_table)
            .await?;
        let mapping = ColumnMapping::resolve(&source, &target, &stored, config.unmatched_columns)?;

        let mut key_columns = Vec::with_capacity(config.business_keys.len());
        for key in &config.business_keys {
            let Some(target_name) = mapping.target_for(key) else {
                bail!(
                    ErrorKind::InvalidArgument,
                    "Business key column is not a mapped column",
                    format!("`{key}` matches no mapped column of `{source_table}`")
                );
            };
            key_columns.push(target_name.to_owned());
        }
        let keys = BusinessKeySet::new(key_columns)?;

        let mut exclude_fields = Vec::with_capacity(config.exclude_fields.len());
        for field in &config.exclude_fields {
            match mapping.target_for(field) {
                Some(target_name) => exclude_fields.push(target_name.to_owned()),
                None => debug!(field = %field, "excluded field is not a mapped column, ignoring"),
            }
        }

        let stamps = StampColumns::resolve(&target, &config.stamp_columns)?;
        let status = StatusFilter::new(stamps.status.name.clone(), config.inactive_status.clone());

        let registry = store.load_version_registry().await?;
        registry.ensure_complete()?;

        Ok(MergePlan {
            source,
            target,
            mapping,
            keys,
            exclude_fields,
            stamps,
            status,
            registry,
        })
    }

    pub fn source_table(&self) -> &TableName {
        self.source.table()
    }

    pub fn target_table(&self) -> &TableName {
        self.target.table()
    }

    pub fn target_columns(&self) -> &TableColumns {
        &self.target
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn keys(&self) -> &BusinessKeySet {
        &self.keys
    }

    pub fn exclude_fields(&self) -> &[String] {
        &self.exclude_fields
    }

    pub fn stamps(&self) -> &StampColumns {
        &self.stamps
    }

    pub fn status(&self) -> &StatusFilter {
        &self.status
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    /// Source columns to read, in source order.
    pub fn source_read_columns(&self) -> Vec<ColumnSchema> {
        self.mapping
            .columns()
            .iter()
            .map(|column| column.source.clone())
            .collect()
    }

    /// Builds the columns and rows to append for source `records`, stamped from
    /// `descriptor`.
    ///
    /// Mapped columns that are also stamp columns take the stamped value.
    pub fn stamped_rows(
        &self,
        records: Vec<ChangeRecord>,
        descriptor: &VersionDescriptor,
    ) -> (Vec<WriteColumn>, Vec<DatasetRow>) {
        let kept = self
            .mapping
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| !self.stamps.contains(&column.target))
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        let columns = kept
            .iter()
            .map(|index| {
                let column = &self.mapping.columns()[*index];
                WriteColumn::new(column.target.clone(), column.target_typ.clone())
            })
            .chain(self.stamps.write_columns())
            .collect();

        let stamp = StampColumns::cells(descriptor);
        let rows = records
            .into_iter()
            .map(|record| {
                let values = record.row.into_values();
                let mut stamped = Vec::with_capacity(kept.len() + stamp.len());
                stamped.extend(
                    kept.iter()
                        .map(|index| values.get(*index).cloned().unwrap_or(Cell::Null)),
                );
                stamped.extend(stamp.iter().cloned());
                DatasetRow::new(stamped)
            })
            .collect();

        (columns, rows)
    }

    /// Returns the key columns, typed as in the target.
    pub fn key_write_columns(&self) -> Vec<WriteColumn> {
        self.keys
            .columns()
            .iter()
            .map(|key| match self.target.find(key) {
                Some(column) => WriteColumn::from(column),
                None => WriteColumn::new(key.clone(), None),
            })
            .collect()
    }

    /// Returns the distinct key tuples of target `records`, in first-seen order.
    pub fn distinct_keys(&self, records: &[ChangeRecord]) -> Vec<Vec<Cell>> {
        let indexes = self
            .keys
            .columns()
            .iter()
            .filter_map(|key| self.target.columns().iter().position(|c| &c.name == key))
            .collect::<Vec<_>>();

        let mut seen = HashSet::<Vec<NormalizedValue>>::new();
        let mut keys = Vec::new();
        for record in records {
            let key = indexes
                .iter()
                .map(|index| record.row.get(*index).clone())
                .collect::<Vec<_>>();
            let Some(normalized) = key.iter().map(Cell::normalized).collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            if seen.insert(normalized) {
                keys.push(key);
            }
        }

        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChangeCategory;

    fn columns(table: &str, names: &[&str]) -> TableColumns {
        TableColumns::new(
            TableName::new("public", table),
            names
                .iter()
                .map(|name| ColumnSchema::new(*name, "text", "text", true))
                .collect(),
        )
    }

    #[test]
    fn stamp_columns_resolve_ignoring_case() {
        let target = columns(
            "customer",
            &["id", "STATUS", "Effective_Start_Date", "EFFECTIVE_END_DATE", "version_id"],
        );

        let stamps = StampColumns::resolve(&target, &StampColumnsConfig::default()).unwrap();

        assert_eq!(stamps.status.name, "STATUS");
        assert_eq!(stamps.effective_start_date.name, "Effective_Start_Date");
        assert!(stamps.contains("EFFECTIVE_END_DATE"));
        assert!(!stamps.contains("id"));
    }

    #[test]
    fn missing_stamp_column_is_a_configuration_error() {
        let target = columns("customer", &["id", "status"]);

        let err = StampColumns::resolve(&target, &StampColumnsConfig::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigurationError);
    }

    #[test]
    fn stamp_cells_follow_column_order() {
        let descriptor = VersionDescriptor {
            category: ChangeCategory::New,
            status_code: "1".to_owned(),
            effective_start_date: chrono::NaiveDate::from_ymd_opt(2024, 4, 1),
            effective_end_date: None,
            version_id: Some("2024Q2".to_owned()),
        };

        let cells = StampColumns::cells(&descriptor);

        assert_eq!(cells[0], Cell::String("1".to_owned()));
        assert!(matches!(cells[1], Cell::Date(_)));
        assert_eq!(cells[2], Cell::Null);
        assert_eq!(cells[3], Cell::String("2024Q2".to_owned()));
    }
}
