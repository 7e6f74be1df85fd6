use serde::Deserialize;

use crate::Config;
use crate::shared::{MergeConfig, PgConnectionConfig, ValidationError};

/// Top-level configuration of the merger binary.
///
/// Does not implement `Serialize` because the connection config holds a password.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergerConfig {
    pub pg_connection: PgConnectionConfig,
    pub merge: MergeConfig,
}

impl MergerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pg_connection.validate()?;
        self.merge.validate()
    }
}

impl Config for MergerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] =
        &["merge.business_keys", "merge.exclude_fields"];
}
