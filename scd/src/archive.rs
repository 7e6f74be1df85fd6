//! Pre-merge snapshot of the target table.

use config::shared::BackupPolicy;
use tracing::{info, warn};

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::failpoints::{ARCHIVE_AFTER_RENAME, scd_fail_point};
use crate::store::TableStore;
use crate::types::TableName;

/// What an archival did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveReport {
    pub table: TableName,
    pub backup: TableName,
    /// A backup left by an earlier run was dropped first.
    pub replaced_backup: bool,
    /// Rename and copy ran as one transaction.
    pub atomic: bool,
}

/// Moves the live target to `<table>_bu` and recreates the live name as a full copy.
///
/// Every failure is [`ErrorKind::Fatal`], with the original error kept as source and the
/// detail naming the sub-step that failed.
#[derive(Debug)]
pub struct ArchivalManager<'a, S> {
    store: &'a S,
    policy: BackupPolicy,
}

impl<'a, S> ArchivalManager<'a, S>
where
    S: TableStore,
{
    pub fn new(store: &'a S, policy: BackupPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn archive(&self, table: &TableName) -> ScdResult<ArchiveReport> {
        let backup = table.backup();
        let replaced_backup = self.clear_backup(&backup).await?;

        let atomic = self.store.supports_transactional_ddl();
        if atomic {
            self.store
                .snapshot_table(table, &backup)
                .await
                .map_err(|err| {
                    err.escalate(
                        ErrorKind::Fatal,
                        "Archiving the target table failed",
                        format!("snapshot of `{table}` into `{backup}` was rolled back, `{table}` is unchanged"),
                    )
                })?;
        } else {
            self.store
                .rename_table(table, &backup)
                .await
                .map_err(|err| {
                    err.escalate(
                        ErrorKind::Fatal,
                        "Archiving the target table failed",
                        format!("renaming `{table}` to `{backup}` failed"),
                    )
                })?;

            let copied = match scd_fail_point(ARCHIVE_AFTER_RENAME) {
                Ok(()) => self.store.copy_table(&backup, table).await,
                Err(err) => Err(err),
            };
            copied.map_err(|err| {
                err.escalate(
                    ErrorKind::Fatal,
                    "Archiving the target table failed",
                    format!(
                        "`{table}` was renamed to `{backup}` but copying it back failed, only `{backup}` holds the data"
                    ),
                )
            })?;
        }

        info!(table = %table, backup = %backup, atomic, "archived target table");

        Ok(ArchiveReport {
            table: table.clone(),
            backup,
            replaced_backup,
            atomic,
        })
    }

    /// Applies the backup policy to a leftover backup. Returns `true` if one was dropped.
    async fn clear_backup(&self, backup: &TableName) -> ScdResult<bool> {
        let exists = self.store.table_exists(backup).await.map_err(|err| {
            err.escalate(
                ErrorKind::Fatal,
                "Archiving the target table failed",
                format!("checking whether `{backup}` exists failed"),
            )
        })?;
        if !exists {
            return Ok(false);
        }

        match self.policy {
            BackupPolicy::FailOnExisting => {
                bail!(
                    ErrorKind::Fatal,
                    "Backup table already exists",
                    format!(
                        "`{backup}` is left from an earlier run, drop it or use the `replace_existing` backup policy"
                    )
                );
            }
            BackupPolicy::ReplaceExisting => {
                warn!(backup = %backup, "dropping backup table left from an earlier run");
                self.store.drop_table(backup).await.map_err(|err| {
                    err.escalate(
                        ErrorKind::Fatal,
                        "Archiving the target table failed",
                        format!("dropping the existing `{backup}` failed"),
                    )
                })?;

                Ok(true)
            }
        }
    }
}
