use config::shared::{PgConnectionConfig, TlsConfig};
use postgres::sqlx::test_utils::{create_pg_database, drop_pg_database};
use sqlx::PgPool;
use tokio::runtime::Handle;
use uuid::Uuid;

use crate::migrations::apply_control_migrations;
use crate::registry::VersionDescriptor;
use crate::store::PostgresStore;
use crate::types::TableName;

/// Schema holding the tables created by tests.
pub const TEST_DATABASE_SCHEMA: &str = "test";

pub fn test_table_name(name: &str) -> TableName {
    TableName::new(TEST_DATABASE_SCHEMA, name)
}

/// Connection settings for a uniquely named database on the local test server.
///
/// Read from `TESTS_DATABASE_HOST`, `TESTS_DATABASE_PORT`, `TESTS_DATABASE_USERNAME` and
/// the optional `TESTS_DATABASE_PASSWORD`.
pub fn local_pg_connection_config() -> PgConnectionConfig {
    PgConnectionConfig {
        host: std::env::var("TESTS_DATABASE_HOST").expect("TESTS_DATABASE_HOST must be set"),
        port: std::env::var("TESTS_DATABASE_PORT")
            .expect("TESTS_DATABASE_PORT must be set")
            .parse()
            .expect("TESTS_DATABASE_PORT must be a valid port number"),
        name: Uuid::new_v4().to_string(),
        username: std::env::var("TESTS_DATABASE_USERNAME")
            .expect("TESTS_DATABASE_USERNAME must be set"),
        password: std::env::var("TESTS_DATABASE_PASSWORD")
            .ok()
            .map(Into::into),
        tls: TlsConfig::disabled(),
        statement_timeout_ms: None,
    }
}

/// A throwaway database, dropped together with this value.
///
/// Dropping blocks on the cleanup, so tests using it need the multi-threaded runtime.
pub struct TestDatabase {
    pub config: PgConnectionConfig,
    pool: PgPool,
}

impl TestDatabase {
    /// Creates a database with the [`TEST_DATABASE_SCHEMA`] schema.
    pub async fn spawn() -> Self {
        let config = local_pg_connection_config();
        let pool = create_pg_database(&config).await;

        let database = Self { config, pool };
        database
            .run_sql(&format!("create schema {TEST_DATABASE_SCHEMA}"))
            .await;

        database
    }

    /// Creates a database with the test schema and the control tables.
    pub async fn spawn_with_control_tables() -> Self {
        let database = Self::spawn().await;
        apply_control_migrations(&database.config)
            .await
            .expect("Failed to apply control table migrations");

        database
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn store(&self) -> PostgresStore {
        PostgresStore::new(self.pool.clone())
    }

    /// Executes `sql` and returns the number of affected rows.
    pub async fn run_sql(&self, sql: &str) -> u64 {
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .unwrap_or_else(|err| panic!("Failed to execute `{sql}`: {err}"))
            .rows_affected()
    }

    /// Replaces the registry rows with `descriptors`.
    pub async fn seed_registry(&self, descriptors: &[VersionDescriptor]) {
        self.run_sql("delete from table_registry.quarter_detail")
            .await;

        for descriptor in descriptors {
            sqlx::query(
                r#"
                insert into table_registry.quarter_detail
                    (update_type, status, effective_start_date, effective_end_date, version_id)
                values ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(descriptor.category.identifier())
            .bind(&descriptor.status_code)
            .bind(descriptor.effective_start_date)
            .bind(descriptor.effective_end_date)
            .bind(&descriptor.version_id)
            .execute(&self.pool)
            .await
            .expect("Failed to insert registry row");
        }
    }

    /// Returns the number of rows in `table`.
    pub async fn count_rows(&self, table: &TableName) -> i64 {
        sqlx::query_scalar(&format!(
            "select count(*) from {}",
            table.as_quoted_identifier()
        ))
        .fetch_one(&self.pool)
        .await
        .expect("Failed to count rows")
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        // `block_in_place` needs a multi-threaded runtime so other tasks can move to
        // another worker while cleanup blocks this one.
        tokio::task::block_in_place(move || {
            Handle::current().block_on(async move {
                self.pool.close().await;
                drop_pg_database(&self.config).await;
            });
        });
    }
}
