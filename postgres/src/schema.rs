use std::fmt;

use pg_escape::quote_identifier;

/// Suffix appended to a table name to form the name of its backup.
pub const BACKUP_TABLE_SUFFIX: &str = "_bu";

/// Fully qualified Postgres table name.
#[derive(Debug, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct TableName {
    /// The schema name containing the table
    pub schema: String,
    /// The name of the table within the schema
    pub name: String,
}

impl TableName {
    /// Creates a new [`TableName`] with the given schema and table name.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> TableName {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Returns the table name as a properly quoted Postgres identifier.
    pub fn as_quoted_identifier(&self) -> String {
        let quoted_schema = quote_identifier(&self.schema);
        let quoted_name = quote_identifier(&self.name);

        format!("{quoted_schema}.{quoted_name}")
    }

    /// Returns only the table part, quoted, as required by `alter table .. rename to`.
    pub fn as_quoted_name(&self) -> String {
        quote_identifier(&self.name).to_string()
    }

    /// Returns the name of this table's backup, in the same schema.
    pub fn backup(&self) -> TableName {
        TableName::new(
            self.schema.clone(),
            format!("{}{BACKUP_TABLE_SUFFIX}", self.name),
        )
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{0}.{1}", self.schema, self.name))
    }
}

/// Metadata for a single table column as reported by the catalog.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ColumnSchema {
    /// The column name exactly as stored in the catalog
    pub name: String,
    /// Full type including modifiers, e.g. `character varying(20)`, usable in casts
    pub typ: String,
    /// Type without modifiers, e.g. `character varying`
    pub base_typ: String,
    pub nullable: bool,
}

impl ColumnSchema {
    pub fn new(
        name: impl Into<String>,
        typ: impl Into<String>,
        base_typ: impl Into<String>,
        nullable: bool,
    ) -> ColumnSchema {
        Self {
            name: name.into(),
            typ: typ.into(),
            base_typ: base_typ.into(),
            nullable,
        }
    }

    /// Returns the column name quoted for use in SQL.
    pub fn quoted_name(&self) -> String {
        quote_identifier(&self.name).to_string()
    }
}
