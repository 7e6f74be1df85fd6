use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use config::shared::PgConnectionConfig;
use pg_escape::quote_identifier;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Executor, PgConnection, PgPool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::failpoints::{ARCHIVE_AFTER_RENAME, scd_fail_point};
use crate::registry::{ChangeCategory, VersionDescriptor, VersionRegistry};
use crate::schema::{StoredColumnMapping, TableColumns};
use crate::scd_error;
use crate::store::{
    COLUMN_MAPPING_TABLE, CONTROL_SCHEMA, ControlStore, RowUpdate, TableStore,
    VERSION_REGISTRY_TABLE, WriteColumn,
};
use crate::types::{Cell, ColumnSchema, DatasetRow, TableName};

/// Minimum number of connections kept open.
const MIN_POOL_CONNECTIONS: u32 = 1;

/// Maximum number of connections in the pool. A run issues one statement at a time.
const MAX_POOL_CONNECTIONS: u32 = 2;

/// Upper bound on bind parameters in one statement.
const MAX_BIND_PARAMETERS: usize = u16::MAX as usize;

/// Registry columns, resolved ignoring case so legacy mixed-case tables are accepted.
const REGISTRY_COLUMNS: [&str; 5] = [
    "update_type",
    "status",
    "effective_start_date",
    "effective_end_date",
    "version_id",
];

/// Base types decoded into a typed [`Cell`]. Anything else is read through a `text` cast.
///
/// `character` is left out on purpose: the text cast strips its blank padding, so a
/// `char(n)` column compares equal to the same value held in `varchar` or `text`.
const NATIVE_TYPES: &[&str] = &[
    "boolean",
    "smallint",
    "integer",
    "bigint",
    "real",
    "double precision",
    "numeric",
    "text",
    "character varying",
    "name",
    "date",
    "time without time zone",
    "timestamp without time zone",
    "timestamp with time zone",
    "uuid",
    "json",
    "jsonb",
    "bytea",
];

/// Postgres-backed table and control store.
///
/// Identifiers are always quoted, so mixed-case schemas, tables and columns keep their
/// case. Written values are cast to the introspected column type.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the configured database.
    pub async fn connect(config: &PgConnectionConfig) -> ScdResult<Self> {
        let pool =
            postgres::db::connect(config, MIN_POOL_CONNECTIONS, MAX_POOL_CONNECTIONS).await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn select_expression(column: &ColumnSchema) -> String {
    let quoted = column.quoted_name();
    if NATIVE_TYPES.contains(&column.base_typ.as_str()) {
        quoted
    } else {
        format!("{quoted}::text")
    }
}

fn decode_cell(row: &PgRow, index: usize, base_typ: &str) -> Result<Cell, sqlx::Error> {
    let cell = match base_typ {
        "boolean" => row.try_get::<Option<bool>, _>(index)?.map(Cell::Bool),
        "smallint" => row.try_get::<Option<i16>, _>(index)?.map(Cell::I16),
        "integer" => row.try_get::<Option<i32>, _>(index)?.map(Cell::I32),
        "bigint" => row.try_get::<Option<i64>, _>(index)?.map(Cell::I64),
        "real" => row.try_get::<Option<f32>, _>(index)?.map(Cell::F32),
        "double precision" => row.try_get::<Option<f64>, _>(index)?.map(Cell::F64),
        "numeric" => row
            .try_get::<Option<BigDecimal>, _>(index)?
            .map(Cell::Numeric),
        "date" => row.try_get::<Option<NaiveDate>, _>(index)?.map(Cell::Date),
        "time without time zone" => row.try_get::<Option<NaiveTime>, _>(index)?.map(Cell::Time),
        "timestamp without time zone" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(Cell::Timestamp),
        "timestamp with time zone" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Cell::TimestampTz),
        "uuid" => row.try_get::<Option<Uuid>, _>(index)?.map(Cell::Uuid),
        "json" | "jsonb" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(Cell::Json),
        "bytea" => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Cell::Bytes),
        _ => row.try_get::<Option<String>, _>(index)?.map(Cell::String),
    };

    Ok(cell.unwrap_or(Cell::Null))
}

fn bind_cell<'q>(
    query: Query<'q, Postgres, PgArguments>,
    cell: &Cell,
) -> Query<'q, Postgres, PgArguments> {
    match cell {
        Cell::Null => query.bind(None::<String>),
        Cell::Bool(value) => query.bind(*value),
        Cell::I16(value) => query.bind(*value),
        Cell::I32(value) => query.bind(*value),
        Cell::I64(value) => query.bind(*value),
        Cell::F32(value) => query.bind(*value),
        Cell::F64(value) => query.bind(*value),
        Cell::Numeric(value) => query.bind(value.clone()),
        Cell::String(value) => query.bind(value.clone()),
        Cell::Date(value) => query.bind(*value),
        Cell::Time(value) => query.bind(*value),
        Cell::Timestamp(value) => query.bind(*value),
        Cell::TimestampTz(value) => query.bind(*value),
        Cell::Uuid(value) => query.bind(*value),
        Cell::Json(value) => query.bind(value.clone()),
        Cell::Bytes(value) => query.bind(value.clone()),
    }
}

/// Returns the placeholder for parameter `position`, cast to the column type if known.
fn placeholder(position: usize, column: &WriteColumn) -> String {
    match &column.typ {
        Some(typ) => format!("${position}::{typ}"),
        None => format!("${position}"),
    }
}

fn copy_statements(from: &TableName, to: &TableName) -> [String; 2] {
    [
        format!(
            "create table {} (like {} including all)",
            to.as_quoted_identifier(),
            from.as_quoted_identifier()
        ),
        format!(
            "insert into {} overriding system value select * from {}",
            to.as_quoted_identifier(),
            from.as_quoted_identifier()
        ),
    ]
}

/// Moves ownership of the `serial` sequences owned by `from` to the matching columns of `to`.
///
/// `like .. including all` copies the `nextval` defaults but leaves the sequences owned by
/// the source table, which would make the source impossible to drop later on.
async fn adopt_sequences(
    connection: &mut PgConnection,
    from: &TableName,
    to: &TableName,
) -> Result<(), sqlx::Error> {
    let owned = sqlx::query(
        r#"
        select s.oid::regclass::text as sequence_name, a.attname::text as column_name
        from pg_depend d
        join pg_class s on s.oid = d.objid and s.relkind = 'S'
        join pg_attribute a on a.attrelid = d.refobjid and a.attnum = d.refobjsubid
        where d.classid = 'pg_class'::regclass
          and d.refclassid = 'pg_class'::regclass
          and d.refobjid = $1::regclass
          and d.deptype = 'a'
        "#,
    )
    .bind(from.as_quoted_identifier())
    .fetch_all(&mut *connection)
    .await?;

    for row in owned {
        let sequence: String = row.try_get("sequence_name")?;
        let column: String = row.try_get("column_name")?;
        let statement = format!(
            "alter sequence {sequence} owned by {}.{}",
            to.as_quoted_identifier(),
            quote_identifier(&column)
        );
        (&mut *connection).execute(statement.as_str()).await?;
        debug!(sequence = %sequence, table = %to, column = %column, "moved sequence ownership");
    }

    Ok(())
}

/// Advances the identity sequences of `table` past the values already stored in it.
///
/// `like .. including all` gives identity columns a fresh sequence starting at 1, and rows
/// inserted with `overriding system value` do not move it.
async fn sync_identity_sequences(
    connection: &mut PgConnection,
    table: &TableName,
) -> Result<(), sqlx::Error> {
    let columns: Vec<String> = sqlx::query_scalar(
        r#"
        select attname::text
        from pg_attribute
        where attrelid = $1::regclass and attnum > 0 and not attisdropped and attidentity <> ''
        "#,
    )
    .bind(table.as_quoted_identifier())
    .fetch_all(&mut *connection)
    .await?;

    for column in columns {
        // `setval` is strict, an empty table leaves the sequence untouched.
        let statement = format!(
            "select setval(pg_get_serial_sequence($1, $2), max({})) from {}",
            quote_identifier(&column),
            table.as_quoted_identifier()
        );
        sqlx::query(&statement)
            .bind(table.as_quoted_identifier())
            .bind(&column)
            .execute(&mut *connection)
            .await?;
    }

    Ok(())
}

/// Copies `from` into a new table `to` that takes over its sequences.
async fn copy_into_new_table(
    connection: &mut PgConnection,
    from: &TableName,
    to: &TableName,
) -> Result<(), sqlx::Error> {
    for statement in copy_statements(from, to) {
        (&mut *connection).execute(statement.as_str()).await?;
    }
    adopt_sequences(connection, from, to).await?;
    sync_identity_sequences(connection, to).await?;

    Ok(())
}

fn rename_statement(from: &TableName, to: &TableName) -> String {
    format!(
        "alter table {} rename to {}",
        from.as_quoted_identifier(),
        to.as_quoted_name()
    )
}

impl TableStore for PostgresStore {
    async fn table_columns(&self, table: &TableName) -> ScdResult<Vec<ColumnSchema>> {
        let columns = postgres::db::get_table_columns(&self.pool, table).await?;

        Ok(columns)
    }

    async fn table_exists(&self, table: &TableName) -> ScdResult<bool> {
        let exists = postgres::db::table_exists(&self.pool, table).await?;

        Ok(exists)
    }

    async fn read_rows(
        &self,
        table: &TableName,
        columns: &[ColumnSchema],
    ) -> ScdResult<Vec<DatasetRow>> {
        let select_list = columns
            .iter()
            .map(select_expression)
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "select {select_list} from {}",
            table.as_quoted_identifier()
        );

        let pg_rows = sqlx::query(&statement).fetch_all(&self.pool).await?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let values = columns
                .iter()
                .enumerate()
                .map(|(index, column)| decode_cell(pg_row, index, &column.base_typ))
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(DatasetRow::new(values));
        }

        debug!(table = %table, rows = rows.len(), "read table rows");

        Ok(rows)
    }

    async fn rename_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        self.pool.execute(rename_statement(from, to).as_str()).await?;

        Ok(())
    }

    async fn copy_table(&self, from: &TableName, to: &TableName) -> ScdResult<()> {
        let mut transaction = self.pool.begin().await?;
        copy_into_new_table(&mut *transaction, from, to).await?;
        transaction.commit().await?;

        Ok(())
    }

    async fn snapshot_table(&self, table: &TableName, backup: &TableName) -> ScdResult<()> {
        let mut transaction = self.pool.begin().await?;
        transaction
            .execute(rename_statement(table, backup).as_str())
            .await?;
        scd_fail_point(ARCHIVE_AFTER_RENAME)?;
        copy_into_new_table(&mut *transaction, backup, table).await?;
        transaction.commit().await?;

        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn drop_table(&self, table: &TableName) -> ScdResult<()> {
        let statement = format!("drop table {}", table.as_quoted_identifier());
        self.pool.execute(statement.as_str()).await?;

        Ok(())
    }

    async fn create_table_like(&self, table: &TableName, template: &TableName) -> ScdResult<bool> {
        let mut transaction = self.pool.begin().await?;
        if postgres::db::table_exists(&mut *transaction, table).await? {
            return Ok(false);
        }

        let statement = format!(
            "create table {} (like {} including all)",
            table.as_quoted_identifier(),
            template.as_quoted_identifier()
        );
        transaction.execute(statement.as_str()).await?;
        adopt_sequences(&mut *transaction, template, table).await?;
        transaction.commit().await?;

        Ok(true)
    }

    async fn insert_rows(
        &self,
        table: &TableName,
        columns: &[WriteColumn],
        rows: Vec<DatasetRow>,
    ) -> ScdResult<u64> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let column_list = columns
            .iter()
            .map(|column| quote_identifier(&column.name).to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let rows_per_statement = (MAX_BIND_PARAMETERS / columns.len()).max(1);

        let mut inserted = 0;
        let mut transaction = self.pool.begin().await?;
        for chunk in rows.chunks(rows_per_statement) {
            let values = (0..chunk.len())
                .map(|row_index| {
                    let placeholders = columns
                        .iter()
                        .enumerate()
                        .map(|(column_index, column)| {
                            placeholder(row_index * columns.len() + column_index + 1, column)
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("({placeholders})")
                })
                .collect::<Vec<_>>()
                .join(", ");
            let statement = format!(
                "insert into {} ({column_list}) values {values}",
                table.as_quoted_identifier()
            );

            let mut query = sqlx::query(&statement);
            for row in chunk {
                for index in 0..columns.len() {
                    query = bind_cell(query, row.get(index));
                }
            }

            inserted += query.execute(&mut *transaction).await?.rows_affected();
        }
        transaction.commit().await?;

        debug!(table = %table, rows = inserted, "inserted rows");

        Ok(inserted)
    }

    async fn update_rows(&self, table: &TableName, update: &RowUpdate) -> ScdResult<u64> {
        if update.assignments.is_empty() || update.key_columns.is_empty() {
            return Ok(0);
        }

        let mut position = 0;
        let mut next_placeholder = |column: &WriteColumn| {
            position += 1;
            placeholder(position, column)
        };

        let assignments = update
            .assignments
            .iter()
            .map(|(column, _)| {
                format!(
                    "{} = {}",
                    quote_identifier(&column.name),
                    next_placeholder(column)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut conditions = update
            .key_columns
            .iter()
            .map(|column| {
                format!(
                    "{} = {}",
                    quote_identifier(&column.name),
                    next_placeholder(column)
                )
            })
            .collect::<Vec<_>>();
        if let Some(status) = &update.active_only {
            let status_column = quote_identifier(status.column()).to_string();
            let inactive = next_placeholder(&WriteColumn::new(status.column(), None));
            conditions.push(format!(
                "({status_column} is null or btrim({status_column}::text) <> {inactive})"
            ));
        }

        let statement = format!(
            "update {} set {assignments} where {}",
            table.as_quoted_identifier(),
            conditions.join(" and ")
        );

        let mut updated = 0;
        let mut transaction = self.pool.begin().await?;
        for key in &update.keys {
            if key.len() != update.key_columns.len() || key.iter().any(Cell::is_null) {
                continue;
            }

            let mut query = sqlx::query(&statement);
            for (_, value) in &update.assignments {
                query = bind_cell(query, value);
            }
            for value in key {
                query = bind_cell(query, value);
            }
            if let Some(status) = &update.active_only {
                query = query.bind(status.inactive_code().to_owned());
            }

            updated += query.execute(&mut *transaction).await?.rows_affected();
        }
        transaction.commit().await?;

        debug!(table = %table, rows = updated, "updated rows");

        Ok(updated)
    }
}

impl ControlStore for PostgresStore {
    async fn load_version_registry(&self) -> ScdResult<VersionRegistry> {
        let registry_table = TableName::new(CONTROL_SCHEMA, VERSION_REGISTRY_TABLE);
        let columns = postgres::db::get_table_columns(&self.pool, &registry_table).await?;
        if columns.is_empty() {
            bail!(
                ErrorKind::ConfigurationError,
                "Version registry table is missing",
                format!("`{registry_table}` does not exist, apply the control table migrations")
            );
        }

        let registry_columns = TableColumns::new(registry_table.clone(), columns);
        let mut resolved = Vec::with_capacity(REGISTRY_COLUMNS.len());
        for name in REGISTRY_COLUMNS {
            let Some(column) = registry_columns.find(name) else {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Version registry table is missing a column",
                    format!("`{registry_table}` has no column `{name}`")
                );
            };
            resolved.push(column.quoted_name());
        }

        let statement = format!(
            "select {}::text, {}::text, {}::date, {}::date, {}::text from {}",
            resolved[0],
            resolved[1],
            resolved[2],
            resolved[3],
            resolved[4],
            registry_table.as_quoted_identifier()
        );
        let rows = sqlx::query(&statement).fetch_all(&self.pool).await?;

        let mut descriptors = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(update_type) = row.try_get::<Option<String>, _>(0)? else {
                continue;
            };
            let Ok(category) = update_type.parse::<ChangeCategory>() else {
                debug!(update_type = %update_type, "ignoring unknown registry category");
                continue;
            };

            let status_code = row.try_get::<Option<String>, _>(1)?.ok_or_else(|| {
                scd_error!(
                    ErrorKind::ConfigurationError,
                    "Version registry row has no status",
                    format!("category `{category}` has a null status")
                )
            })?;

            descriptors.push(VersionDescriptor {
                category,
                status_code,
                effective_start_date: row.try_get(2)?,
                effective_end_date: row.try_get(3)?,
                version_id: row.try_get(4)?,
            });
        }

        info!(categories = descriptors.len(), "loaded version registry");

        VersionRegistry::new(descriptors)
    }

    async fn load_column_mappings(
        &self,
        schema: &str,
        source_table: &str,
        target_table: &str,
    ) -> ScdResult<Vec<StoredColumnMapping>> {
        let mapping_table = TableName::new(CONTROL_SCHEMA, COLUMN_MAPPING_TABLE);
        if !postgres::db::table_exists(&self.pool, &mapping_table).await? {
            debug!(table = %mapping_table, "no column mapping table, using name matching only");
            return Ok(Vec::new());
        }

        let statement = format!(
            r#"
            select source_column, target_column
            from {}
            where schema_name = $1 and source_table = $2 and target_table = $3
            order by source_column
            "#,
            mapping_table.as_quoted_identifier()
        );
        let rows = sqlx::query(&statement)
            .bind(schema)
            .bind(source_table)
            .bind(target_table)
            .fetch_all(&self.pool)
            .await?;

        let mut mappings = Vec::with_capacity(rows.len());
        for row in rows {
            mappings.push(StoredColumnMapping::new(
                schema,
                source_table,
                target_table,
                row.try_get::<String, _>("source_column")?,
                row.try_get::<Option<String>, _>("target_column")?,
            ));
        }

        Ok(mappings)
    }

    async fn upsert_column_mappings(&self, mappings: &[StoredColumnMapping]) -> ScdResult<u64> {
        let mapping_table = TableName::new(CONTROL_SCHEMA, COLUMN_MAPPING_TABLE);
        let statement = format!(
            r#"
            insert into {} (schema_name, source_table, target_table, source_column, target_column)
            values ($1, $2, $3, $4, $5)
            on conflict (schema_name, source_table, target_table, source_column)
            do update set target_column = excluded.target_column
            "#,
            mapping_table.as_quoted_identifier()
        );

        let mut written = 0;
        let mut transaction = self.pool.begin().await?;
        for mapping in mappings {
            written += sqlx::query(&statement)
                .bind(&mapping.schema)
                .bind(&mapping.source_table)
                .bind(&mapping.target_table)
                .bind(&mapping.source_column)
                .bind(&mapping.target_column)
                .execute(&mut *transaction)
                .await?
                .rows_affected();
        }
        transaction.commit().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_types_are_read_as_text() {
        let native = ColumnSchema::new("Amount", "numeric(10,2)", "numeric", true);
        let custom = ColumnSchema::new("period", "int4range", "int4range", true);

        assert_eq!(select_expression(&native), r#""Amount""#);
        assert_eq!(select_expression(&custom), "period::text");
    }

    #[test]
    fn fixed_length_characters_are_read_unpadded() {
        let fixed = ColumnSchema::new("code", "character(5)", "character", true);
        let varying = ColumnSchema::new("code", "character varying(5)", "character varying", true);

        assert_eq!(select_expression(&fixed), "code::text");
        assert_eq!(select_expression(&varying), "code");
    }

    #[test]
    fn placeholders_cast_to_known_types() {
        let typed = WriteColumn::new("name", Some("character varying(20)".into()));
        let untyped = WriteColumn::new("name", None);

        assert_eq!(placeholder(3, &typed), "$3::character varying(20)");
        assert_eq!(placeholder(1, &untyped), "$1");
    }

    #[test]
    fn archive_statements_quote_identifiers() {
        let table = TableName::new("Sales", "Customer");
        let backup = table.backup();

        assert_eq!(
            rename_statement(&table, &backup),
            r#"alter table "Sales"."Customer" rename to "Customer_bu""#
        );
        assert_eq!(
            copy_statements(&backup, &table)[0],
            r#"create table "Sales"."Customer" (like "Sales"."Customer_bu" including all)"#
        );
    }
}
