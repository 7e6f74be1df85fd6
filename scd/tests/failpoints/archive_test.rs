use scd::error::ErrorKind;
use scd::failpoints::ARCHIVE_AFTER_RENAME;
use scd::merge::{MergeExecutor, MergePhase};
use scd::store::TableStore;
use scd::test_utils::database::{TestDatabase, test_table_name};
use scd::test_utils::failpoints::FailpointGuard;
use scd::test_utils::fixtures::{
    NEW_STATUS, customer_merge_config, memory_store, registry_descriptors, source_row,
    target_row, target_table,
};
use telemetry::init_test_tracing;

#[tokio::test]
async fn crash_between_rename_and_copy_leaves_only_the_backup() {
    init_test_tracing();
    let _failpoints = FailpointGuard::configure(&[(ARCHIVE_AFTER_RENAME, "return")]);

    let store = memory_store(
        "public",
        vec![source_row(1, "A", None)],
        vec![
            target_row(1, "A", None, NEW_STATUS),
            target_row(2, "B", None, NEW_STATUS),
        ],
    )
    .await;

    let failure = MergeExecutor::new(store.clone(), customer_merge_config("public"))
        .run()
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.phase, MergePhase::Archiving);
    assert_eq!(failure.kind(), ErrorKind::Fatal);

    let target = target_table("public");
    assert!(!store.table_exists(&target).await.unwrap());
    assert_eq!(store.dataset(&target.backup()).await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_inside_the_snapshot_transaction_rolls_back() {
    init_test_tracing();
    let _failpoints = FailpointGuard::configure(&[(ARCHIVE_AFTER_RENAME, "return")]);

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    database
        .run_sql(
            r#"
            create table test.stg_customer (id integer, name text, city text);
            insert into test.stg_customer values (1, 'A', null);

            create table test.customer (
                id integer,
                name text,
                city text,
                status text,
                effective_start_date date,
                effective_end_date date,
                version_id text
            );
            insert into test.customer values (1, 'A', null, '1', '2024-01-01', null, '2024Q1');
            "#,
        )
        .await;

    let failure = MergeExecutor::new(database.store(), customer_merge_config("test"))
        .run()
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.phase, MergePhase::Archiving);
    assert_eq!(failure.kind(), ErrorKind::Fatal);
    assert!(failure.error.detail().unwrap().contains("rolled back"));

    let store = database.store();
    let target = test_table_name("customer");
    assert_eq!(database.count_rows(&target).await, 1);
    assert!(!store.table_exists(&target.backup()).await.unwrap());
}
