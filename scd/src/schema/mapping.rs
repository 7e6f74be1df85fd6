use std::collections::HashMap;

use config::shared::UnmatchedColumnPolicy;
use tracing::{debug, warn};

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::schema::TableColumns;
use crate::types::ColumnSchema;

/// A persisted source to target column correspondence.
///
/// Unique per `(schema, source_table, target_table, source_column)`. A `None` target marks
/// the source column as deliberately ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredColumnMapping {
    pub schema: String,
    pub source_table: String,
    pub target_table: String,
    pub source_column: String,
    pub target_column: Option<String>,
}

impl StoredColumnMapping {
    pub fn new(
        schema: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: Option<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
            source_column: source_column.into(),
            target_column: target_column.filter(|column| !column.is_empty()),
        }
    }
}

/// How a source column found its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingOrigin {
    /// A stored mapping named the target column.
    Stored,
    /// The target has a column with the same name, ignoring case.
    Matched,
    /// No target column matched and the source name is used as is.
    Passthrough,
}

/// One source column and the target column it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    pub source: ColumnSchema,
    /// Canonical target column name.
    pub target: String,
    /// Target column type, `None` for passthrough columns.
    pub target_typ: Option<String>,
    pub origin: MappingOrigin,
}

/// Source to target column correspondence resolved once per run.
///
/// Column order follows the source table. Ignored source columns are not part of
/// [`ColumnMapping::columns`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    columns: Vec<MappedColumn>,
    ignored: Vec<String>,
}

impl ColumnMapping {
    /// Resolves every source column against the target.
    ///
    /// For each source column, in source order: a stored mapping wins, then a target column
    /// with the same name ignoring case, then `policy` decides between failing and passing
    /// the source name through.
    pub fn resolve(
        source: &TableColumns,
        target: &TableColumns,
        stored: &[StoredColumnMapping],
        policy: UnmatchedColumnPolicy,
    ) -> ScdResult<ColumnMapping> {
        let stored_by_source = stored
            .iter()
            .map(|mapping| (mapping.source_column.to_lowercase(), mapping))
            .collect::<HashMap<_, _>>();

        let mut columns = Vec::with_capacity(source.columns().len());
        let mut ignored = Vec::new();

        for source_column in source.columns() {
            let stored = stored_by_source.get(&source_column.name.to_lowercase());
            let mapped = match stored {
                Some(StoredColumnMapping {
                    target_column: None,
                    ..
                }) => {
                    debug!(column = %source_column.name, "source column ignored by stored mapping");
                    ignored.push(source_column.name.clone());
                    continue;
                }
                Some(StoredColumnMapping {
                    target_column: Some(target_column),
                    ..
                }) => {
                    let Some(target_schema) = target.find(target_column) else {
                        bail!(
                            ErrorKind::ConfigurationError,
                            "Stored column mapping names a missing target column",
                            format!(
                                "`{}` is mapped to `{target_column}`, which `{}` does not have",
                                source_column.name,
                                target.table()
                            )
                        );
                    };

                    MappedColumn {
                        source: source_column.clone(),
                        target: target_schema.name.clone(),
                        target_typ: Some(target_schema.typ.clone()),
                        origin: MappingOrigin::Stored,
                    }
                }
                None => match target.find(&source_column.name) {
                    Some(target_schema) => MappedColumn {
                        source: source_column.clone(),
                        target: target_schema.name.clone(),
                        target_typ: Some(target_schema.typ.clone()),
                        origin: MappingOrigin::Matched,
                    },
                    None => match policy {
                        UnmatchedColumnPolicy::Reject => {
                            bail!(
                                ErrorKind::ConfigurationError,
                                "Source column has no target column",
                                format!(
                                    "`{}` has no stored mapping and no column of `{}` matches it",
                                    source_column.name,
                                    target.table()
                                )
                            );
                        }
                        UnmatchedColumnPolicy::Passthrough => {
                            warn!(
                                column = %source_column.name,
                                target = %target.table(),
                                "source column has no target match, passing its name through"
                            );
                            MappedColumn {
                                source: source_column.clone(),
                                target: source_column.name.clone(),
                                target_typ: None,
                                origin: MappingOrigin::Passthrough,
                            }
                        }
                    },
                },
            };

            if let Some(previous) = columns
                .iter()
                .find(|column: &&MappedColumn| column.target == mapped.target)
            {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Two source columns map to the same target column",
                    format!(
                        "`{}` and `{}` both map to `{}`",
                        previous.source.name, mapped.source.name, mapped.target
                    )
                );
            }

            columns.push(mapped);
        }

        if columns.is_empty() {
            bail!(
                ErrorKind::ConfigurationError,
                "No source column maps to the target",
                format!("every column of `{}` is ignored", source.table())
            );
        }

        Ok(ColumnMapping { columns, ignored })
    }

    pub fn columns(&self) -> &[MappedColumn] {
        &self.columns
    }

    /// Source columns skipped because a stored mapping ignores them.
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Source column names to read, in source order.
    pub fn source_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.source.name.clone())
            .collect()
    }

    /// Target column names the source columns are written to, in source order.
    pub fn target_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.target.clone())
            .collect()
    }

    /// Resolves a user supplied column name to its target name.
    ///
    /// Target names are tried first, then source names, both ignoring case.
    pub fn target_for(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.target.eq_ignore_ascii_case(name))
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|column| column.source.name.eq_ignore_ascii_case(name))
            })
            .map(|column| column.target.as_str())
    }
}
