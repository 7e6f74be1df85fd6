use std::fmt;

use thiserror::Error;

use crate::error::{ErrorKind, ScdError};

/// Phase of a merge run.
///
/// Phases are entered strictly in declaration order. [`MergePhase::Failed`] can be entered
/// from any phase that is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergePhase {
    /// No run has started, or a new run is about to.
    Idle,
    /// Columns, mapping, keys and the version registry are being resolved.
    Introspecting,
    /// The target is being moved to its backup and recreated as a copy.
    Archiving,
    /// A target-shaped table is being created if the target is missing.
    StructureEnsured,
    /// Rows with keys unknown to the target are being appended.
    NewInserted,
    /// Active target rows whose key left the source are being terminated in place.
    TerminatedMarked,
    /// New versions of changed rows are being appended.
    ChangeInserted,
    /// Every phase succeeded.
    Completed,
    /// A phase failed and the run stopped.
    Failed,
}

impl MergePhase {
    /// Returns `true` if no further phase follows.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` once the target may have been modified.
    ///
    /// A run that fails at or after archival cannot be resumed, it must start over.
    pub fn mutates_target(&self) -> bool {
        matches!(
            self,
            Self::Archiving
                | Self::StructureEnsured
                | Self::NewInserted
                | Self::TerminatedMarked
                | Self::ChangeInserted
        )
    }
}

impl fmt::Display for MergePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Introspecting => "introspecting",
            Self::Archiving => "archiving",
            Self::StructureEnsured => "structure_ensured",
            Self::NewInserted => "new_inserted",
            Self::TerminatedMarked => "terminated_marked",
            Self::ChangeInserted => "change_inserted",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };

        f.write_str(name)
    }
}

/// Row counts of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
    /// Rows appended for keys the target did not have.
    pub new: u64,
    /// Active target rows terminated because their key left the source.
    pub terminated: u64,
    /// Rows appended as a new version of a changed record.
    pub changed: u64,
}

/// Why a run stopped, and where.
#[derive(Debug, Clone, Error)]
#[error("merge failed while {phase}: {error}")]
pub struct MergeFailure {
    /// Phase that was in progress when the error occurred.
    pub phase: MergePhase,
    #[source]
    pub error: ScdError,
}

impl MergeFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Result of one merge run. There is no partial outcome.
#[derive(Debug, Clone)]
pub enum MergeOutcome {
    Completed(MergeCounts),
    Failed(MergeFailure),
}

impl MergeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn into_result(self) -> Result<MergeCounts, MergeFailure> {
        match self {
            Self::Completed(counts) => Ok(counts),
            Self::Failed(failure) => Err(failure),
        }
    }
}
