use config::shared::{IntoConnectOptions, PgConnectionConfig};
use sqlx::{Executor, postgres::PgPoolOptions};
use tracing::info;

/// Creates the `table_registry` schema and applies all pending control table migrations.
///
/// The `_sqlx_migrations` metadata table is created inside `table_registry` so the data
/// schemas only ever hold merged tables.
pub async fn apply_control_migrations(
    connection_config: &PgConnectionConfig,
) -> Result<(), sqlx::Error> {
    let options = connection_config.with_db();

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("create schema if not exists table_registry;")
                    .await?;

                // Keeps the `_sqlx_migrations` table out of the public schema.
                conn.execute("set search_path = 'table_registry';").await?;

                Ok(())
            })
        })
        .connect_with(options)
        .await?;

    info!("applying control table migrations");

    let migrator = sqlx::migrate!("./migrations");
    migrator.run(&pool).await?;

    info!("control table migrations successfully applied");

    Ok(())
}
