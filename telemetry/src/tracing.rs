use std::path::PathBuf;
use std::sync::Once;

use config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Directory receiving log files in production, relative to the working directory.
const LOGS_DIR: &str = "logs";

/// Overrides [`LOGS_DIR`] when set.
const LOGS_DIR_ENV_NAME: &str = "APP_LOGS_DIR";

/// Enables tracing output in tests when set to any value.
const ENABLE_TEST_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Filter applied when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,sqlx=warn";

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("failed to bridge `log` records into tracing: {0}")]
    LogTracer(#[from] tracing_log::log_tracer::SetLoggerError),

    #[error("failed to install the global subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Flushes buffered log lines when dropped.
///
/// Must be held until the process is about to exit, otherwise trailing log lines written by
/// the background writer are lost.
#[must_use = "dropping the flusher stops the background log writer"]
pub struct LogFlusher {
    _guard: Option<WorkerGuard>,
}

/// Installs the global tracing subscriber for `app_name`.
///
/// In [`Environment::Dev`] events are printed to stdout in human readable form. In
/// [`Environment::Prod`] they are written as JSON lines to a daily rotated file under
/// `logs/`. `RUST_LOG` overrides the default filter in both cases, and records emitted
/// through the `log` crate are forwarded.
pub fn init_tracing(app_name: &str, environment: Environment) -> Result<LogFlusher, TracingError> {
    tracing_log::LogTracer::init()?;

    let filter = build_env_filter()?;

    if environment.is_prod() {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(app_name)
            .filename_suffix("log")
            .build(logs_dir())?;
        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_writer(writer)
            .with_filter(filter);
        tracing_subscriber::registry().with(layer).try_init()?;

        return Ok(LogFlusher {
            _guard: Some(guard),
        });
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);
    tracing_subscriber::registry().with(layer).try_init()?;

    Ok(LogFlusher { _guard: None })
}

/// Installs a test subscriber once per process, only if `ENABLE_TRACING` is set.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_test_tracing() {
    if std::env::var_os(ENABLE_TEST_TRACING_ENV_NAME).is_none() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn build_env_filter() -> Result<EnvFilter, TracingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(DEFAULT_FILTER)?),
    }
}

fn logs_dir() -> PathBuf {
    std::env::var_os(LOGS_DIR_ENV_NAME)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LOGS_DIR))
}
