//! Named fault injection points, active only with the `failpoints` feature.

use fail::fail_point;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};

/// Between renaming the target to its backup and copying the backup back.
pub const ARCHIVE_AFTER_RENAME: &str = "archive.after_rename";

/// Before the rows of a mutating phase are written to the target.
pub const MERGE_BEFORE_WRITE: &str = "merge.before_write";

/// Returns an error when the named failpoint is configured to `return`.
///
/// The optional parameter selects the error kind: `transient` or `store` (default).
pub fn scd_fail_point(name: &str) -> ScdResult<()> {
    fail_point!(name, |parameter| {
        let error_kind = match parameter.as_deref() {
            Some("transient") => ErrorKind::TransientStoreError,
            _ => ErrorKind::StoreError,
        };

        bail!(
            error_kind,
            "An error occurred in a fail point",
            format!("The failpoint '{name}' returned an error")
        );
    });

    Ok(())
}
