//! Configuration types shared by the merge engine and the merger binary.

mod base;
mod connection;
mod merge;
mod merger;

pub use base::ValidationError;
pub use connection::{IntoConnectOptions, PgConnectionConfig, SessionOptions, TlsConfig};
pub use merge::{
    BackupPolicy, DEFAULT_EXCLUDE_FIELDS, MergeConfig, StampColumnsConfig, UnmatchedColumnPolicy,
};
pub use merger::MergerConfig;
