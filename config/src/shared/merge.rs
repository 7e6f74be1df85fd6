use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Fields excluded from change detection when none are configured.
///
/// The lifecycle stamp columns always differ between versions, so comparing them would flag
/// every matched row as changed.
pub const DEFAULT_EXCLUDE_FIELDS: &[&str] = &[
    "STATUS",
    "EFFECTIVE_START_DATE",
    "EFFECTIVE_END_DATE",
    "VERSION_ID",
];

/// What to do with a source column that has neither a persisted mapping nor a same-named
/// target column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedColumnPolicy {
    /// Fail the run with a configuration error naming the column.
    #[default]
    Reject,
    /// Carry the source column name through unchanged.
    Passthrough,
}

/// What to do when `<target>_bu` already exists at archive time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupPolicy {
    /// Abort before touching the target.
    #[default]
    FailOnExisting,
    /// Drop the previous backup and archive again.
    ReplaceExisting,
}

/// Physical names of the lifecycle columns stamped onto inserted and terminated rows.
///
/// Names are matched case-insensitively against the target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StampColumnsConfig {
    #[serde(default = "StampColumnsConfig::default_status")]
    pub status: String,
    #[serde(default = "StampColumnsConfig::default_effective_start_date")]
    pub effective_start_date: String,
    #[serde(default = "StampColumnsConfig::default_effective_end_date")]
    pub effective_end_date: String,
    #[serde(default = "StampColumnsConfig::default_version_id")]
    pub version_id: String,
}

impl StampColumnsConfig {
    fn default_status() -> String {
        "status".to_owned()
    }

    fn default_effective_start_date() -> String {
        "effective_start_date".to_owned()
    }

    fn default_effective_end_date() -> String {
        "effective_end_date".to_owned()
    }

    fn default_version_id() -> String {
        "version_id".to_owned()
    }

    /// Returns the four names in stamping order.
    pub fn as_array(&self) -> [&str; 4] {
        [
            &self.status,
            &self.effective_start_date,
            &self.effective_end_date,
            &self.version_id,
        ]
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let names = self.as_array();
        for (index, name) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyValue("merge.stamp_columns"));
            }

            if names[..index]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(name))
            {
                return Err(ValidationError::DuplicateStampColumn((*name).to_owned()));
            }
        }

        Ok(())
    }
}

impl Default for StampColumnsConfig {
    fn default() -> Self {
        Self {
            status: Self::default_status(),
            effective_start_date: Self::default_effective_start_date(),
            effective_end_date: Self::default_effective_end_date(),
            version_id: Self::default_version_id(),
        }
    }
}

/// Describes one merge of a staging table into its SCD2 target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergeConfig {
    /// Schema containing both the source and the target table.
    pub schema: String,
    pub source_table: String,
    pub target_table: String,
    /// Columns jointly identifying a logical entity.
    pub business_keys: Vec<String>,
    /// Columns ignored when comparing a source row with its active target version.
    #[serde(default = "MergeConfig::default_exclude_fields")]
    pub exclude_fields: Vec<String>,
    #[serde(default)]
    pub unmatched_columns: UnmatchedColumnPolicy,
    #[serde(default)]
    pub backup: BackupPolicy,
    /// Status code marking a target row as no longer current.
    #[serde(default = "MergeConfig::default_inactive_status")]
    pub inactive_status: String,
    #[serde(default)]
    pub stamp_columns: StampColumnsConfig,
}

impl MergeConfig {
    fn default_exclude_fields() -> Vec<String> {
        DEFAULT_EXCLUDE_FIELDS
            .iter()
            .map(|field| (*field).to_owned())
            .collect()
    }

    fn default_inactive_status() -> String {
        "0".to_owned()
    }

    /// Builds a config with default policies for the given tables and keys.
    pub fn new(
        schema: impl Into<String>,
        source_table: impl Into<String>,
        target_table: impl Into<String>,
        business_keys: Vec<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            source_table: source_table.into(),
            target_table: target_table.into(),
            business_keys,
            exclude_fields: Self::default_exclude_fields(),
            unmatched_columns: UnmatchedColumnPolicy::default(),
            backup: BackupPolicy::default(),
            inactive_status: Self::default_inactive_status(),
            stamp_columns: StampColumnsConfig::default(),
        }
    }

    /// Validates names and keys before anything touches the database.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema.trim().is_empty() {
            return Err(ValidationError::EmptyValue("merge.schema"));
        }

        if self.source_table.trim().is_empty() {
            return Err(ValidationError::EmptyValue("merge.source_table"));
        }

        if self.target_table.trim().is_empty() {
            return Err(ValidationError::EmptyValue("merge.target_table"));
        }

        if self.source_table == self.target_table {
            return Err(ValidationError::SourceIsTarget(self.source_table.clone()));
        }

        if self.business_keys.is_empty() {
            return Err(ValidationError::NoBusinessKeys);
        }

        for (index, key) in self.business_keys.iter().enumerate() {
            if key.trim().is_empty() {
                return Err(ValidationError::EmptyValue("merge.business_keys"));
            }

            if self.business_keys[..index]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(key))
            {
                return Err(ValidationError::DuplicateBusinessKey(key.clone()));
            }
        }

        if self.inactive_status.is_empty() {
            return Err(ValidationError::EmptyValue("merge.inactive_status"));
        }

        self.stamp_columns.validate()
    }
}
