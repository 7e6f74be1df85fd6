use config::shared::MergerConfig;
use scd::merge::{MergeExecutor, MergePreview};
use scd::migrations::apply_control_migrations;
use scd::schema::StoredColumnMapping;
use scd::store::{ControlStore, PostgresStore};
use scd::types::ChangeRecord;
use tracing::{info, warn};

use crate::error::MergerResult;

/// Runs one merge of the configured source into its target.
pub async fn run_merge(config: MergerConfig) -> MergerResult<()> {
    log_config(&config);

    let store = PostgresStore::connect(&config.pg_connection).await?;
    let mut executor = MergeExecutor::new(store, config.merge);
    let counts = executor.run().await.into_result()?;

    println!(
        "merge completed: {} new, {} terminated, {} changed",
        counts.new, counts.terminated, counts.changed
    );

    Ok(())
}

/// Classifies the configured pair without touching either table.
pub async fn preview_merge(config: MergerConfig, show_rows: bool) -> MergerResult<()> {
    log_config(&config);

    let store = PostgresStore::connect(&config.pg_connection).await?;
    let preview = MergeExecutor::new(store, config.merge).preview().await?;

    print_preview(&preview, show_rows);

    Ok(())
}

/// Persists a single column mapping for the configured pair.
///
/// An empty `target_column` records the source column as ignored.
pub async fn upsert_mapping(
    config: MergerConfig,
    source_column: String,
    target_column: String,
) -> MergerResult<()> {
    let mapping = StoredColumnMapping::new(
        config.merge.schema,
        config.merge.source_table,
        config.merge.target_table,
        source_column,
        Some(target_column),
    );

    let store = PostgresStore::connect(&config.pg_connection).await?;
    store.upsert_column_mappings(&[mapping.clone()]).await?;

    match &mapping.target_column {
        Some(target) => info!(
            source_column = %mapping.source_column,
            target_column = %target,
            "stored column mapping"
        ),
        None => info!(
            source_column = %mapping.source_column,
            "stored column as ignored"
        ),
    }

    Ok(())
}

/// Prints the stored column mappings of the configured pair.
pub async fn list_mappings(config: MergerConfig) -> MergerResult<()> {
    let store = PostgresStore::connect(&config.pg_connection).await?;
    let mappings = store
        .load_column_mappings(
            &config.merge.schema,
            &config.merge.source_table,
            &config.merge.target_table,
        )
        .await?;

    if mappings.is_empty() {
        warn!(
            schema = %config.merge.schema,
            source_table = %config.merge.source_table,
            target_table = %config.merge.target_table,
            "no column mappings stored"
        );
    }

    for mapping in mappings {
        println!(
            "{} -> {}",
            mapping.source_column,
            mapping.target_column.as_deref().unwrap_or("(ignored)")
        );
    }

    Ok(())
}

/// Creates or upgrades the control tables.
pub async fn migrate(config: MergerConfig) -> MergerResult<()> {
    apply_control_migrations(&config.pg_connection).await?;
    info!("control table migrations applied");

    Ok(())
}

fn print_preview(preview: &MergePreview, show_rows: bool) {
    let partition = &preview.partition;
    println!(
        "new: {}, changed: {}, terminated: {}, unchanged: {}",
        partition.new.len(),
        partition.changed.len(),
        partition.terminated.len(),
        partition.unchanged.len()
    );

    if !show_rows {
        return;
    }

    print_records(&preview.source_columns, &partition.new);
    print_records(&preview.source_columns, &partition.changed);
    print_records(&preview.target_columns, &partition.terminated);
}

fn print_records(columns: &[String], records: &[ChangeRecord]) {
    for record in records {
        let values = columns
            .iter()
            .zip(record.row.values())
            .map(|(column, value)| format!("{column}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}: {values}", record.classification);
    }
}

fn log_config(config: &MergerConfig) {
    let merge = &config.merge;
    info!(
        host = %config.pg_connection.host,
        database = %config.pg_connection.name,
        tls_enabled = config.pg_connection.tls.enabled,
        "pg connection config"
    );
    info!(
        schema = %merge.schema,
        source_table = %merge.source_table,
        target_table = %merge.target_table,
        business_keys = ?merge.business_keys,
        exclude_fields = ?merge.exclude_fields,
        backup = ?merge.backup,
        unmatched_columns = ?merge.unmatched_columns,
        "merge config"
    );
}
