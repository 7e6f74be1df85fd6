use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    #[error("`{0}` cannot be empty")]
    EmptyValue(&'static str),
    #[error("`business_keys` must name at least one column")]
    NoBusinessKeys,
    #[error("business key `{0}` is listed more than once")]
    DuplicateBusinessKey(String),
    #[error("`source_table` and `target_table` must differ, both are `{0}`")]
    SourceIsTarget(String),
    #[error("stamp column `{0}` is configured more than once")]
    DuplicateStampColumn(String),
}
