use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::schema::{ColumnSchema, TableName};

/// Connects to the configured database and waits for the first connection.
pub async fn connect(
    config: &PgConnectionConfig,
    min_connections: u32,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .min_connections(min_connections)
        .max_connections(max_connections)
        .connect_with(config.with_db())
        .await?;

    debug!(
        host = %config.host,
        database = %config.name,
        "connected to postgres"
    );

    Ok(pool)
}

/// Returns the columns of `table` in ordinal order.
///
/// An empty result means the table does not exist or is not visible to the current role.
/// Names are matched exactly, so callers are expected to pass the catalog spelling.
pub async fn get_table_columns<'c, E>(
    executor: E,
    table: &TableName,
) -> Result<Vec<ColumnSchema>, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    let rows = sqlx::query(
        r#"
        select
            a.attname::text as name,
            format_type(a.atttypid, a.atttypmod) as typ,
            format_type(a.atttypid, null) as base_typ,
            not a.attnotnull as nullable
        from pg_catalog.pg_attribute a
        join pg_catalog.pg_class c on c.oid = a.attrelid
        join pg_catalog.pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1
            and c.relname = $2
            and c.relkind in ('r', 'p', 'v', 'm', 'f')
            and a.attnum > 0
            and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_all(executor)
    .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        columns.push(ColumnSchema::new(
            row.try_get::<String, _>("name")?,
            row.try_get::<String, _>("typ")?,
            row.try_get::<String, _>("base_typ")?,
            row.try_get::<bool, _>("nullable")?,
        ));
    }

    Ok(columns)
}

/// Returns `true` when a relation named `table` exists.
pub async fn table_exists<'c, E>(executor: E, table: &TableName) -> Result<bool, sqlx::Error>
where
    E: sqlx::PgExecutor<'c>,
{
    sqlx::query_scalar::<_, bool>(
        r#"
        select exists (
            select 1
            from pg_catalog.pg_class c
            join pg_catalog.pg_namespace n on n.oid = c.relnamespace
            where n.nspname = $1 and c.relname = $2
        )
        "#,
    )
    .bind(&table.schema)
    .bind(&table.name)
    .fetch_one(executor)
    .await
}
