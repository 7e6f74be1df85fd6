use scd::error::ErrorKind;
use scd::failpoints::MERGE_BEFORE_WRITE;
use scd::merge::{MergeExecutor, MergePhase};
use scd::test_utils::failpoints::FailpointGuard;
use scd::test_utils::fixtures::{
    NEW_STATUS, customer_merge_config, memory_store, source_row, target_row, target_table,
};
use scd::types::Cell;
use telemetry::init_test_tracing;

const SCHEMA: &str = "public";

/// Source adds key 3 and changes key 2; target key 4 vanished.
async fn store() -> scd::store::MemoryStore {
    memory_store(
        SCHEMA,
        vec![
            source_row(1, "A", None),
            source_row(2, "B", None),
            source_row(3, "C", None),
        ],
        vec![
            target_row(1, "A", None, NEW_STATUS),
            target_row(2, "X", None, NEW_STATUS),
            target_row(4, "D", None, NEW_STATUS),
        ],
    )
    .await
}

#[tokio::test]
async fn failure_in_terminated_phase_keeps_earlier_writes() {
    init_test_tracing();
    let _failpoints = FailpointGuard::configure(&[(MERGE_BEFORE_WRITE, "1*off->return")]);

    let store = store().await;
    let mut executor = MergeExecutor::new(store.clone(), customer_merge_config(SCHEMA));
    let failure = executor.run().await.into_result().unwrap_err();

    assert_eq!(failure.phase, MergePhase::TerminatedMarked);
    assert_eq!(failure.kind(), ErrorKind::StoreError);
    assert_eq!(executor.phase(), MergePhase::Failed);

    // The new row for key 3 was written, key 4 is still active.
    let target = store.dataset(&target_table(SCHEMA)).await.unwrap();
    assert_eq!(target.len(), 4);
    let vanished = target
        .rows()
        .iter()
        .find(|row| target.value(row, "id") == Some(&Cell::I32(4)))
        .unwrap();
    assert_eq!(target.value(vanished, "status"), Some(&Cell::from(NEW_STATUS)));
}

#[tokio::test]
async fn transient_failures_keep_their_kind() {
    init_test_tracing();
    let _failpoints = FailpointGuard::configure(&[(MERGE_BEFORE_WRITE, "return(transient)")]);

    let store = store().await;
    let failure = MergeExecutor::new(store.clone(), customer_merge_config(SCHEMA))
        .run()
        .await
        .into_result()
        .unwrap_err();

    assert_eq!(failure.phase, MergePhase::NewInserted);
    assert_eq!(failure.kind(), ErrorKind::TransientStoreError);
    assert_eq!(
        store.dataset(&target_table(SCHEMA)).await.unwrap().len(),
        3
    );
}
