use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use scd::classify::StatusFilter;
use scd::error::ErrorKind;
use scd::registry::ChangeCategory;
use scd::schema::StoredColumnMapping;
use scd::store::{ControlStore, RowUpdate, TableStore, WriteColumn};
use scd::test_utils::database::{TestDatabase, test_table_name};
use scd::test_utils::fixtures::{DELETE_STATUS, registry_descriptors};
use scd::types::{Cell, ColumnSchema, DatasetRow};
use serde_json::json;
use telemetry::init_test_tracing;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread")]
async fn introspection_keeps_case_and_type_modifiers() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database
        .run_sql(
            r#"create table test."Customer" ("Id" integer not null, "Name" varchar(20), amount numeric(10,2))"#,
        )
        .await;

    let columns = database
        .store()
        .table_columns(&test_table_name("Customer"))
        .await
        .unwrap();

    assert_eq!(
        columns,
        vec![
            ColumnSchema::new("Id", "integer", "integer", false),
            ColumnSchema::new("Name", "character varying(20)", "character varying", true),
            ColumnSchema::new("amount", "numeric(10,2)", "numeric", true),
        ]
    );
    assert!(
        database
            .store()
            .table_columns(&test_table_name("customer"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn typed_cells_round_trip() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database
        .run_sql(
            r#"
            create table test.typed (
                id bigint not null,
                active boolean,
                amount numeric(10,2),
                born date,
                seen_at timestamptz,
                token uuid,
                payload jsonb,
                note text,
                period int4range
            )
            "#,
        )
        .await;

    let store = database.store();
    let table = test_table_name("typed");
    let columns = store.table_columns(&table).await.unwrap();
    let write_columns = columns.iter().map(WriteColumn::from).collect::<Vec<_>>();

    let seen_at = DateTime::<Utc>::from_timestamp(1_714_000_000, 0).unwrap();
    let token = Uuid::new_v4();
    let row = vec![
        Cell::I64(7),
        Cell::Bool(true),
        Cell::Numeric("12.50".parse::<BigDecimal>().unwrap()),
        Cell::Date(NaiveDate::from_ymd_opt(1990, 5, 17).unwrap()),
        Cell::TimestampTz(seen_at),
        Cell::Uuid(token),
        Cell::Json(json!({"tier": "gold"})),
        Cell::Null,
        Cell::String("[1,5)".to_owned()),
    ];

    let inserted = store
        .insert_rows(&table, &write_columns, vec![DatasetRow::new(row.clone())])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let rows = store.read_rows(&table, &columns).await.unwrap();
    assert_eq!(rows, vec![DatasetRow::new(row)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_is_atomic() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database
        .run_sql(
            r#"
            create table test."Customer" (id integer primary key, name text);
            insert into test."Customer" values (1, 'A'), (2, 'B');
            "#,
        )
        .await;

    let store = database.store();
    let table = test_table_name("Customer");
    let backup = table.backup();

    store.snapshot_table(&table, &backup).await.unwrap();
    assert_eq!(database.count_rows(&table).await, 2);
    assert_eq!(database.count_rows(&backup).await, 2);
    assert_eq!(
        store.table_columns(&table).await.unwrap(),
        store.table_columns(&backup).await.unwrap()
    );

    // The backup now exists, so the rename fails and nothing changes.
    database
        .run_sql(r#"insert into test."Customer" values (3, 'C')"#)
        .await;
    let err = store.snapshot_table(&table, &backup).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreError);
    assert_eq!(database.count_rows(&table).await, 3);
    assert_eq!(database.count_rows(&backup).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn update_only_touches_active_rows() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database
        .run_sql(
            r#"
            create table test.customer (id integer, status integer, ended date);
            insert into test.customer values (1, 1, null), (1, 0, null), (2, 1, null), (null, 1, null);
            "#,
        )
        .await;

    let store = database.store();
    let table = test_table_name("customer");
    let update = RowUpdate {
        key_columns: vec![WriteColumn::new("id", Some("integer".to_owned()))],
        keys: vec![vec![Cell::I32(1)], vec![Cell::Null]],
        assignments: vec![
            (
                WriteColumn::new("status", Some("integer".to_owned())),
                Cell::String(DELETE_STATUS.to_owned()),
            ),
            (
                WriteColumn::new("ended", Some("date".to_owned())),
                Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()),
            ),
        ],
        active_only: Some(StatusFilter::new("status", DELETE_STATUS)),
    };

    let updated = store.update_rows(&table, &update).await.unwrap();
    assert_eq!(updated, 1);

    let ended = sqlx::query_scalar::<_, i64>(
        "select count(*) from test.customer where ended is not null",
    )
    .fetch_one(database.pool())
    .await
    .unwrap();
    assert_eq!(ended, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn control_tables_round_trip() {
    init_test_tracing();

    let database = TestDatabase::spawn_with_control_tables().await;
    database.seed_registry(&registry_descriptors()).await;
    let store = database.store();

    let registry = store.load_version_registry().await.unwrap();
    registry.ensure_complete().unwrap();
    for descriptor in registry_descriptors() {
        assert_eq!(registry.lookup(descriptor.category).unwrap(), &descriptor);
    }

    let mapping = |target: Option<&str>| {
        StoredColumnMapping::new(
            "test",
            "stg_customer",
            "customer",
            "cust_name",
            target.map(str::to_owned),
        )
    };
    store
        .upsert_column_mappings(&[mapping(Some("name"))])
        .await
        .unwrap();
    store.upsert_column_mappings(&[mapping(None)]).await.unwrap();

    let stored = store
        .load_column_mappings("test", "stg_customer", "customer")
        .await
        .unwrap();
    assert_eq!(stored, vec![mapping(None)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_registry_columns_resolve_ignoring_case() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    database
        .run_sql(
            r#"
            create schema table_registry;
            create table table_registry.quarter_detail (
                "Update_type" varchar(30),
                "STATUS" integer,
                "Effective_Start_Date" date,
                "EFFECTIVE_END_DATE" date,
                "Version_ID" varchar(10)
            );
            insert into table_registry.quarter_detail values
                ('New', 1, '2024-04-01', null, '2024Q2'),
                ('change-based new', 2, '2024-04-01', null, '2024Q2'),
                ('Delete', 0, null, '2024-03-31', null),
                ('Archived', 9, null, null, null);
            "#,
        )
        .await;

    let registry = database.store().load_version_registry().await.unwrap();

    registry.ensure_complete().unwrap();
    let changed = registry.lookup(ChangeCategory::ChangeBasedNew).unwrap();
    assert_eq!(changed.status_code, "2");
    assert_eq!(changed.version_id.as_deref(), Some("2024Q2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_control_tables() {
    init_test_tracing();

    let database = TestDatabase::spawn().await;
    let store = database.store();

    let err = store.load_version_registry().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigurationError);

    let mappings = store
        .load_column_mappings("test", "stg_customer", "customer")
        .await
        .unwrap();
    assert!(mappings.is_empty());

    let err = store
        .read_rows(&test_table_name("missing"), &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
