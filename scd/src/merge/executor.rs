use config::shared::MergeConfig;
use tracing::{debug, error, info, warn};

use crate::archive::ArchivalManager;
use crate::classify::{Partition, classify_all, classify_changed, classify_new, classify_terminated};
use crate::error::ScdResult;
use crate::failpoints::{MERGE_BEFORE_WRITE, scd_fail_point};
use crate::merge::{MergeCounts, MergeFailure, MergeOutcome, MergePhase, MergePlan};
use crate::registry::ChangeCategory;
use crate::store::{ControlStore, RowUpdate, TableStore, WriteColumn};
use crate::types::{ChangeRecord, Dataset};

/// Source and target as read at the start of a phase, both labelled with target column
/// names.
struct Snapshots {
    source: Dataset,
    target: Dataset,
}

/// Classified records of a dry run.
#[derive(Debug, Clone)]
pub struct MergePreview {
    /// Column names of new, changed and unchanged records.
    pub source_columns: Vec<String>,
    /// Column names of terminated records.
    pub target_columns: Vec<String>,
    pub partition: Partition,
}

/// Drives one merge run through its phases against a store.
///
/// Each phase reads the tables afresh, so later phases observe the writes of earlier ones.
/// The executor takes no lock: callers must not run two merges on the same source and
/// target at the same time.
#[derive(Debug)]
pub struct MergeExecutor<S> {
    store: S,
    config: MergeConfig,
    phase: MergePhase,
}

impl<S> MergeExecutor<S>
where
    S: TableStore + ControlStore,
{
    pub fn new(store: S, config: MergeConfig) -> Self {
        Self {
            store,
            config,
            phase: MergePhase::Idle,
        }
    }

    /// Phase the last run reached, [`MergePhase::Idle`] before the first run.
    pub fn phase(&self) -> MergePhase {
        self.phase
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs every phase in order and reports the outcome.
    ///
    /// Each call starts from [`MergePhase::Idle`]. A failed run is never resumed or retried.
    pub async fn run(&mut self) -> MergeOutcome {
        self.phase = MergePhase::Idle;

        match self.execute().await {
            Ok(counts) => {
                self.transition(MergePhase::Completed);
                info!(
                    new = counts.new,
                    terminated = counts.terminated,
                    changed = counts.changed,
                    "merge completed"
                );

                MergeOutcome::Completed(counts)
            }
            Err(err) => {
                let phase = self.phase;
                error!(
                    phase = %phase,
                    kind = %err.kind(),
                    error = %err,
                    "merge failed"
                );
                if phase.mutates_target() {
                    warn!(
                        target_table = %self.config.target_table,
                        "the target may have been modified, inspect it and its backup before running again"
                    );
                }
                self.phase = MergePhase::Failed;

                MergeOutcome::Failed(MergeFailure { phase, error: err })
            }
        }
    }

    /// Classifies the current tables without archiving or writing anything.
    pub async fn preview(&self) -> ScdResult<MergePreview> {
        let plan = MergePlan::resolve(&self.store, &self.config).await?;
        let snapshots = self.read_snapshots(&plan).await?;

        let partition = classify_all(
            &snapshots.source,
            &snapshots.target,
            plan.keys(),
            plan.status(),
            plan.exclude_fields(),
        )?;

        info!(
            new = partition.new.len(),
            changed = partition.changed.len(),
            terminated = partition.terminated.len(),
            unchanged = partition.unchanged.len(),
            "merge preview classified records"
        );

        Ok(MergePreview {
            source_columns: snapshots.source.columns().to_vec(),
            target_columns: snapshots.target.columns().to_vec(),
            partition,
        })
    }

    fn transition(&mut self, phase: MergePhase) {
        self.phase = phase;
        info!(
            phase = %phase,
            schema = %self.config.schema,
            source_table = %self.config.source_table,
            target_table = %self.config.target_table,
            "merge phase"
        );
    }

    async fn execute(&mut self) -> ScdResult<MergeCounts> {
        self.transition(MergePhase::Introspecting);
        let plan = MergePlan::resolve(&self.store, &self.config).await?;

        self.transition(MergePhase::Archiving);
        ArchivalManager::new(&self.store, self.config.backup)
            .archive(plan.target_table())
            .await?;

        self.transition(MergePhase::StructureEnsured);
        self.ensure_structure(&plan).await?;

        self.transition(MergePhase::NewInserted);
        let new = self.insert_new(&plan).await?;

        self.transition(MergePhase::TerminatedMarked);
        let terminated = self.mark_terminated(&plan).await?;

        self.transition(MergePhase::ChangeInserted);
        let changed = self.insert_changed(&plan).await?;

        Ok(MergeCounts {
            new,
            terminated,
            changed,
        })
    }

    async fn read_snapshots(&self, plan: &MergePlan) -> ScdResult<Snapshots> {
        let source_rows = self
            .store
            .read_rows(plan.source_table(), &plan.source_read_columns())
            .await?;
        let target_rows = self
            .store
            .read_rows(plan.target_table(), plan.target_columns().columns())
            .await?;

        Ok(Snapshots {
            source: Dataset::new(plan.mapping().target_names(), source_rows),
            target: Dataset::new(plan.target_columns().names(), target_rows),
        })
    }

    async fn ensure_structure(&self, plan: &MergePlan) -> ScdResult<()> {
        let target = plan.target_table();
        let created = self
            .store
            .create_table_like(target, &target.backup())
            .await?;
        if created {
            warn!(table = %target, "target table was missing and has been recreated empty");
        }

        Ok(())
    }

    async fn append(
        &self,
        plan: &MergePlan,
        records: Vec<ChangeRecord>,
        category: ChangeCategory,
    ) -> ScdResult<u64> {
        let descriptor = plan.registry().lookup(category)?;
        let (columns, rows) = plan.stamped_rows(records, descriptor);

        scd_fail_point(MERGE_BEFORE_WRITE)?;
        if rows.is_empty() {
            return Ok(0);
        }

        self.store
            .insert_rows(plan.target_table(), &columns, rows)
            .await
    }

    async fn insert_new(&self, plan: &MergePlan) -> ScdResult<u64> {
        let snapshots = self.read_snapshots(plan).await?;
        let records = classify_new(&snapshots.source, &snapshots.target, plan.keys())?;
        debug!(records = records.len(), "classified new records");

        let inserted = self.append(plan, records, ChangeCategory::New).await?;
        info!(rows = inserted, "inserted new records");

        Ok(inserted)
    }

    async fn mark_terminated(&self, plan: &MergePlan) -> ScdResult<u64> {
        let snapshots = self.read_snapshots(plan).await?;
        let records = classify_terminated(
            &snapshots.source,
            &snapshots.target,
            plan.keys(),
            plan.status(),
        )?;
        debug!(records = records.len(), "classified terminated records");

        let descriptor = plan.registry().lookup(ChangeCategory::Delete)?;
        let stamps = plan.stamps();
        let update = RowUpdate {
            key_columns: plan.key_write_columns(),
            keys: plan.distinct_keys(&records),
            assignments: vec![
                (WriteColumn::from(&stamps.status), descriptor.status_cell()),
                (
                    WriteColumn::from(&stamps.effective_end_date),
                    descriptor.effective_end_date_cell(),
                ),
            ],
            active_only: Some(plan.status().clone()),
        };

        scd_fail_point(MERGE_BEFORE_WRITE)?;
        if !update.keys.is_empty() {
            let updated = self.store.update_rows(plan.target_table(), &update).await?;
            debug!(rows = updated, keys = update.keys.len(), "terminated target rows");
        }

        let terminated = records.len() as u64;
        info!(rows = terminated, "marked terminated records");

        Ok(terminated)
    }

    async fn insert_changed(&self, plan: &MergePlan) -> ScdResult<u64> {
        let snapshots = self.read_snapshots(plan).await?;
        let records = classify_changed(
            &snapshots.source,
            &snapshots.target,
            plan.keys(),
            plan.status(),
            plan.exclude_fields(),
        )?;
        debug!(records = records.len(), "classified changed records");

        let inserted = self
            .append(plan, records, ChangeCategory::ChangeBasedNew)
            .await?;
        info!(rows = inserted, "inserted changed records");

        Ok(inserted)
    }
}
