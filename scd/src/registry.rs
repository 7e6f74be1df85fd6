//! Version registry: status and effective dating per change category.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::bail;
use crate::error::{ErrorKind, ScdError, ScdResult};
use crate::scd_error;
use crate::types::Cell;

/// Kind of change a stamped row results from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeCategory {
    /// Rows appended for keys absent from the target.
    New,
    /// Rows appended as a new version of a changed key.
    ChangeBasedNew,
    /// Target rows terminated because their key left the source.
    Delete,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 3] = [
        ChangeCategory::New,
        ChangeCategory::ChangeBasedNew,
        ChangeCategory::Delete,
    ];

    /// Returns the identifier used in the registry's `update_type` column.
    pub fn identifier(&self) -> &'static str {
        match self {
            ChangeCategory::New => "New",
            ChangeCategory::ChangeBasedNew => "Change-Based New",
            ChangeCategory::Delete => "Delete",
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for ChangeCategory {
    type Err = ScdError;

    /// Parses a registry identifier, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ChangeCategory::ALL
            .into_iter()
            .find(|category| category.identifier().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                scd_error!(
                    ErrorKind::ConfigurationError,
                    "Unknown change category",
                    format!("`{s}` is not one of `New`, `Change-Based New` or `Delete`")
                )
            })
    }
}

/// Stamping values for one change category, fixed for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    pub category: ChangeCategory,
    pub status_code: String,
    pub effective_start_date: Option<NaiveDate>,
    pub effective_end_date: Option<NaiveDate>,
    pub version_id: Option<String>,
}

impl VersionDescriptor {
    pub fn status_cell(&self) -> Cell {
        Cell::String(self.status_code.clone())
    }

    pub fn effective_start_date_cell(&self) -> Cell {
        self.effective_start_date.into()
    }

    pub fn effective_end_date_cell(&self) -> Cell {
        self.effective_end_date.into()
    }

    pub fn version_id_cell(&self) -> Cell {
        self.version_id.clone().into()
    }
}

/// Snapshot of the registry taken once per run.
#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    descriptors: HashMap<ChangeCategory, VersionDescriptor>,
}

impl VersionRegistry {
    /// Builds a registry, rejecting more than one descriptor for a category.
    pub fn new(descriptors: Vec<VersionDescriptor>) -> ScdResult<Self> {
        let mut by_category = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let category = descriptor.category;
            if by_category.insert(category, descriptor).is_some() {
                bail!(
                    ErrorKind::ConfigurationError,
                    "Version registry lists a category more than once",
                    format!("category `{category}` is duplicated")
                );
            }
        }

        Ok(Self {
            descriptors: by_category,
        })
    }

    /// Returns the descriptor for `category`.
    pub fn lookup(&self, category: ChangeCategory) -> ScdResult<&VersionDescriptor> {
        self.descriptors.get(&category).ok_or_else(|| {
            scd_error!(
                ErrorKind::ConfigurationError,
                "Version registry is missing a category",
                format!("no registry row with update type `{category}`")
            )
        })
    }

    /// Fails unless every category has a descriptor.
    pub fn ensure_complete(&self) -> ScdResult<()> {
        let missing = ChangeCategory::ALL
            .into_iter()
            .filter(|category| !self.descriptors.contains_key(category))
            .map(|category| format!("`{category}`"))
            .collect::<Vec<_>>();

        if !missing.is_empty() {
            bail!(
                ErrorKind::ConfigurationError,
                "Version registry is missing a category",
                format!("no registry rows for {}", missing.join(", "))
            );
        }

        Ok(())
    }
}
