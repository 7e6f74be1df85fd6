use std::error::Error;

use config::LoadConfigError;
use config::shared::ValidationError;
use scd::error::ScdError;
use scd::merge::MergeFailure;
use telemetry::TracingError;
use thiserror::Error;

/// Result type for merger operations.
pub type MergerResult<T> = Result<T, MergerError>;

/// Error type for the merger binary.
///
/// Wraps [`MergeFailure`] and [`ScdError`] for engine errors and provides variants for
/// startup errors.
#[derive(Debug, Error)]
pub enum MergerError {
    #[error("{0}")]
    Merge(#[from] MergeFailure),

    #[error("{0}")]
    Scd(#[from] ScdError),

    #[error("configuration error: {0}")]
    Load(#[from] LoadConfigError),

    #[error("configuration error: {0}")]
    Validation(#[from] ValidationError),

    #[error("logging setup error: {0}")]
    Tracing(#[from] TracingError),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergerError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            MergerError::Merge(_) | MergerError::Scd(_) => "merge error",
            MergerError::Load(_) | MergerError::Validation(_) => "configuration error",
            MergerError::Tracing(_) => "logging error",
            MergerError::Migration(_) => "migration error",
            MergerError::Io(_) => "i/o error",
        }
    }

    /// Returns a user-oriented report for terminal output.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        out.push_str("merger failed\n");
        out.push_str(&format!("category: {}\n", self.category()));

        match self {
            MergerError::Merge(failure) => {
                out.push_str(&format!("phase: {}\n", failure.phase));
                out.push_str(&format!("kind: {}\n", failure.kind()));
                out.push_str(&format!("error: {}\n", failure.error));
                if failure.phase.mutates_target() {
                    out.push_str("note: earlier phases were committed, inspect the target and its backup before rerunning\n");
                }
            }
            MergerError::Scd(err) => {
                out.push_str(&format!("kind: {}\n", err.kind()));
                out.push_str(&format!("error: {err}\n"));
            }
            other => {
                out.push_str(&format!("error: {other}\n"));
                let mut source = Error::source(other);
                let mut idx = 1usize;
                while let Some(err) = source {
                    out.push_str(&format!("cause {idx}: {err}\n"));
                    source = err.source();
                    idx += 1;
                }
            }
        }

        out
    }
}
