//! Error types and result definitions for merge operations.
//!
//! [`ScdError`] carries an [`ErrorKind`] that callers branch on, a static description, an
//! optional dynamic detail, an optional source error and the callsite where it was created.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for merge operations using [`ScdError`] as the error type.
pub type ScdResult<T> = Result<T, ScdError>;

/// Categories of failure a merge run can report.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Missing registry category, unusable column mapping or invalid merge settings.
    ConfigurationError,
    /// A table or schema does not exist or exposes no columns.
    NotFound,
    /// Empty or unresolvable business keys and malformed exclusions.
    InvalidArgument,
    /// Data violating the merge preconditions, such as null or duplicated business keys.
    InvalidData,
    /// Partial failure that needs operator remediation, e.g. a half-completed archive.
    Fatal,
    /// Timeouts and connectivity problems reported by the backing store.
    TransientStoreError,
    /// Any other failure reported by the backing store.
    StoreError,
    /// Local I/O failures.
    IoError,
    /// Failures encoding or decoding JSON values.
    SerializationError,
}

impl ErrorKind {
    /// Returns `true` when retrying the whole run from scratch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::TransientStoreError)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type of the merge engine.
///
/// Cloning is cheap, the source and backtrace are reference counted.
#[derive(Debug, Clone)]
pub struct ScdError {
    payload: Box<ErrorPayload>,
}

impl ScdError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the dynamic detail if any was attached.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the callsite where this error was created.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Attaches an originating error, exposed through [`error::Error::source`].
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Rewrites this error into another kind, keeping the original as its source.
    ///
    /// Used where a lower level failure changes meaning in context, such as a store error
    /// raised halfway through archival becoming [`ErrorKind::Fatal`].
    #[track_caller]
    pub fn escalate<D>(self, kind: ErrorKind, description: &'static str, detail: D) -> ScdError
    where
        D: Into<Cow<'static, str>>,
    {
        ScdError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(detail.into()),
            Some(Arc::new(self)),
        )
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        ScdError {
            payload: Box::new(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for ScdError {
    fn eq(&self, other: &ScdError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for ScdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let payload = &self.payload;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            payload.location.file(),
            payload.location.line(),
            payload.location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write!(f, "\n  Detail:")?;
                for line in detail.lines() {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        let rendered_backtrace = payload.backtrace.to_string();
        if !rendered_backtrace.trim().is_empty() {
            write!(f, "\n  Backtrace:")?;
            for line in rendered_backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for ScdError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates an [`ScdError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for ScdError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> ScdError {
        ScdError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates an [`ScdError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for ScdError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> ScdError {
        ScdError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for ScdError {
    #[track_caller]
    fn from(err: std::io::Error) -> ScdError {
        let detail = err.to_string();
        ScdError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<serde_json::Error> for ScdError {
    #[track_caller]
    fn from(err: serde_json::Error) -> ScdError {
        let description = match err.classify() {
            serde_json::error::Category::Io => "JSON I/O operation failed",
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => "JSON deserialization failed",
        };

        let detail = err.to_string();
        ScdError::from_components(
            ErrorKind::SerializationError,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// SQLSTATE codes for undefined tables and schemas.
const NOT_FOUND_SQLSTATES: &[&str] = &["42P01", "3F000"];

/// SQLSTATE codes outside the connection and resource classes that are still transient:
/// query canceled (statement timeout), lock not available, serialization failure and
/// deadlock.
const TRANSIENT_SQLSTATES: &[&str] = &["57014", "55P03", "40001", "40P01"];

/// SQLSTATE classes that are transient as a whole: connection exceptions, insufficient
/// resources and operator intervention.
const TRANSIENT_SQLSTATE_CLASSES: &[&str] = &["08", "53", "57P"];

/// Classifies a SQLSTATE code into an [`ErrorKind`] and description.
fn classify_sqlstate(code: &str) -> (ErrorKind, &'static str) {
    if NOT_FOUND_SQLSTATES.contains(&code) {
        return (ErrorKind::NotFound, "Postgres object not found");
    }

    if TRANSIENT_SQLSTATES.contains(&code)
        || TRANSIENT_SQLSTATE_CLASSES
            .iter()
            .any(|class| code.starts_with(class))
    {
        return (
            ErrorKind::TransientStoreError,
            "Postgres operation failed transiently",
        );
    }

    (ErrorKind::StoreError, "Postgres operation failed")
}

/// Converts [`sqlx::Error`] to [`ScdError`].
///
/// Connectivity, pool and timeout failures become [`ErrorKind::TransientStoreError`] so
/// callers can decide to start a fresh run. Missing relations become
/// [`ErrorKind::NotFound`].
impl From<sqlx::Error> for ScdError {
    #[track_caller]
    fn from(err: sqlx::Error) -> ScdError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => classify_sqlstate(&code),
                None => (ErrorKind::StoreError, "Postgres operation failed"),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => (
                ErrorKind::TransientStoreError,
                "Postgres connection pool unavailable",
            ),
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => (
                ErrorKind::TransientStoreError,
                "Postgres connection failed",
            ),
            sqlx::Error::RowNotFound => (ErrorKind::NotFound, "Postgres row not found"),
            _ => (ErrorKind::StoreError, "Postgres operation failed"),
        };

        let detail = err.to_string();
        ScdError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
