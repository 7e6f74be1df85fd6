use chrono::NaiveDate;
use config::shared::{BackupPolicy, MergeConfig};
use scd::error::ErrorKind;
use scd::merge::{MergeCounts, MergeExecutor, MergePhase};
use scd::test_utils::database::{TEST_DATABASE_SCHEMA, TestDatabase, test_table_name};
use scd::test_utils::fixtures::{quarter_end, quarter_start, registry_descriptors};
use telemetry::init_test_tracing;

type CustomerRow = (
    i32,
    Option<String>,
    Option<i32>,
    Option<NaiveDate>,
    Option<NaiveDate>,
    Option<String>,
);

/// Creates mixed-case source and target tables.
///
/// Target rows: 1 and 2 active, 4 active and about to vanish, 5 already inactive.
async fn setup_customer_tables(database: &TestDatabase) {
    database
        .run_sql(
            r#"
            create table test."Stg_Customer" ("ID" integer not null, "NAME" text, "City" text);
            insert into test."Stg_Customer" values (1, 'A', null), (2, 'B', null), (3, 'C', 'Oslo');

            create table test."Customer" (
                "Id" integer not null,
                "Name" varchar(50),
                "City" text,
                "STATUS" integer,
                "Effective_Start_Date" date,
                "EFFECTIVE_END_DATE" date,
                "Version_Id" text
            );
            insert into test."Customer" values
                (1, 'A', null, 1, '2024-01-01', null, '2024Q1'),
                (2, 'X', null, 1, '2024-01-01', null, '2024Q1'),
                (4, 'D', null, 1, '2024-01-01', null, '2024Q1'),
                (5, 'E', null, 0, '2023-01-01', '2023-12-31', '2023Q4');
            "#,
        )
        .await;
}

fn merge_config() -> MergeConfig {
    MergeConfig::new(
        TEST_DATABASE_SCHEMA,
        "Stg_Customer",
        "Customer",
        vec!["id".to_owned()],
    )
}

async fn customer_rows(database: &TestDatabase) -> Vec<CustomerRow> {
    sqlx::query_as(
        r#"
        select "Id", "Name", "STATUS", "Effective_Start_Date", "EFFECTIVE_END_DATE", "Version_Id"
        from test."Customer"
        order by "Id", "STATUS"
        "#,
    )
    .fetch_all(database.pool())
    .await
    .unwrap()
}

fn jan_first() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(2024, 1, 1)
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_preserves_history_with_mixed_case_identifiers() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    setup_customer_tables(&database).await;

    let mut executor = MergeExecutor::new(database.store(), merge_config());
    let counts = executor.run().await.into_result().unwrap();

    assert_eq!(
        counts,
        MergeCounts {
            new: 1,
            terminated: 1,
            changed: 1,
        }
    );
    assert_eq!(executor.phase(), MergePhase::Completed);

    let q1 = Some("2024Q1".to_owned());
    let q2 = Some("2024Q2".to_owned());
    assert_eq!(
        customer_rows(&database).await,
        vec![
            (1, Some("A".into()), Some(1), jan_first(), None, q1.clone()),
            (2, Some("X".into()), Some(1), jan_first(), None, q1.clone()),
            (2, Some("B".into()), Some(2), Some(quarter_start()), None, q2.clone()),
            (3, Some("C".into()), Some(1), Some(quarter_start()), None, q2),
            (4, Some("D".into()), Some(0), jan_first(), Some(quarter_end()), q1),
            (
                5,
                Some("E".into()),
                Some(0),
                NaiveDate::from_ymd_opt(2023, 1, 1),
                NaiveDate::from_ymd_opt(2023, 12, 31),
                Some("2023Q4".to_owned())
            ),
        ]
    );
    assert_eq!(
        database
            .count_rows(&test_table_name("Customer").backup())
            .await,
        4
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn preview_reads_without_writing() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    setup_customer_tables(&database).await;
    let before = customer_rows(&database).await;

    let preview = MergeExecutor::new(database.store(), merge_config())
        .preview()
        .await
        .unwrap();

    assert_eq!(preview.source_columns, vec!["Id", "Name", "City"]);
    assert_eq!(preview.partition.new.len(), 1);
    assert_eq!(preview.partition.changed.len(), 1);
    assert_eq!(preview.partition.terminated.len(), 1);
    assert_eq!(preview.partition.unchanged.len(), 1);
    assert_eq!(customer_rows(&database).await, before);
}

#[tokio::test(flavor = "multi_thread")]
async fn leftover_backup_stops_the_run() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    setup_customer_tables(&database).await;
    database
        .run_sql(r#"create table test."Customer_bu" (like test."Customer")"#)
        .await;
    let before = customer_rows(&database).await;

    let failure = MergeExecutor::new(database.store(), merge_config())
        .run()
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.phase, MergePhase::Archiving);
    assert_eq!(failure.kind(), ErrorKind::Fatal);
    assert_eq!(customer_rows(&database).await, before);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_registry_rows_fail_introspection() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    setup_customer_tables(&database).await;

    let failure = MergeExecutor::new(database.store(), merge_config())
        .run()
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.phase, MergePhase::Introspecting);
    assert_eq!(failure.kind(), ErrorKind::ConfigurationError);
}

/// Creates an `Account` target whose surrogate key is defined by `surrogate_key`.
///
/// Source holds keys 1 and 2, target only key 1.
async fn setup_account_tables(database: &TestDatabase, surrogate_key: &str) {
    database
        .run_sql(&format!(
            r#"
            create table test.stg_account (id integer not null, name text);
            insert into test.stg_account values (1, 'A'), (2, 'B');

            create table test."Account" (
                sk {surrogate_key},
                id integer not null,
                name text,
                status integer,
                effective_start_date date,
                effective_end_date date,
                version_id text
            );
            insert into test."Account" (id, name, status, effective_start_date, version_id)
                values (1, 'A', 1, '2024-01-01', '2024Q1');
            "#
        ))
        .await;
}

fn account_config() -> MergeConfig {
    let mut config = MergeConfig::new(
        TEST_DATABASE_SCHEMA,
        "stg_account",
        "Account",
        vec!["id".to_owned()],
    );
    config.backup = BackupPolicy::ReplaceExisting;

    config
}

async fn distinct_surrogate_keys(database: &TestDatabase) -> (i64, i64) {
    sqlx::query_as(r#"select count(*), count(distinct sk) from test."Account""#)
        .fetch_one(database.pool())
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn serial_columns_keep_their_sequence_across_runs() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    setup_account_tables(&database, "serial primary key").await;

    let first = MergeExecutor::new(database.store(), account_config())
        .run()
        .await
        .into_result()
        .unwrap();
    assert_eq!(first.new, 1);

    // The second run drops the backup left by the first one.
    let second = MergeExecutor::new(database.store(), account_config())
        .run()
        .await
        .into_result()
        .unwrap();
    assert_eq!(second, MergeCounts::default());

    database.run_sql(r#"drop table test."Account_bu""#).await;
    database
        .run_sql(r#"insert into test."Account" (id, name) values (3, 'C')"#)
        .await;

    assert_eq!(distinct_surrogate_keys(&database).await, (3, 3));
}

#[tokio::test(flavor = "multi_thread")]
async fn identity_columns_continue_after_archiving() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    setup_account_tables(&database, "integer generated always as identity primary key").await;

    let counts = MergeExecutor::new(database.store(), account_config())
        .run()
        .await
        .into_result()
        .unwrap();
    assert_eq!(counts.new, 1);

    database
        .run_sql(r#"insert into test."Account" (id, name) values (3, 'C')"#)
        .await;

    assert_eq!(distinct_surrogate_keys(&database).await, (3, 3));
}

#[tokio::test(flavor = "multi_thread")]
async fn fixed_length_target_columns_match_unpadded_source_values() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    database
        .run_sql(
            r#"
            create table test.stg_code (id integer not null, code varchar(5));
            insert into test.stg_code values (1, 'ab');

            create table test.code (
                id integer not null,
                code char(5),
                status integer,
                effective_start_date date,
                effective_end_date date,
                version_id text
            );
            insert into test.code values (1, 'ab', 1, '2024-01-01', null, '2024Q1');
            "#,
        )
        .await;

    let config = MergeConfig::new(
        TEST_DATABASE_SCHEMA,
        "stg_code",
        "code",
        vec!["id".to_owned()],
    );
    let preview = MergeExecutor::new(database.store(), config)
        .preview()
        .await
        .unwrap();

    assert!(preview.partition.changed.is_empty());
    assert_eq!(preview.partition.unchanged.len(), 1);
}
