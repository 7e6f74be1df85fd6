use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Session settings applied to every Postgres connection.
///
/// Dates are rendered in ISO form so textual round trips through the store are stable.
pub struct SessionOptions;

impl SessionOptions {
    /// Returns the settings as key-value pairs for the connection startup packet.
    ///
    /// `statement_timeout` is only set when a timeout is configured, leaving the server default
    /// otherwise.
    pub fn to_key_value_pairs(statement_timeout_ms: Option<u64>) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("intervalstyle".to_string(), "postgres".to_string()),
            ("extra_float_digits".to_string(), "3".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ];

        if let Some(timeout) = statement_timeout_ms {
            pairs.push(("statement_timeout".to_string(), timeout.to_string()));
        }

        pairs
    }
}

/// Connection settings for the Postgres database holding the source, target and control
/// tables.
///
/// This intentionally does not implement `Serialize` so the password never ends up in a
/// serialized form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database to connect to.
    pub name: String,
    pub username: String,
    pub password: Option<SecretString>,
    #[serde(default = "TlsConfig::disabled")]
    pub tls: TlsConfig,
    /// Server-side statement timeout in milliseconds.
    ///
    /// Statements exceeding it are canceled by the server and surface as transient store errors.
    #[serde(default)]
    pub statement_timeout_ms: Option<u64>,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyValue("pg_connection.host"));
        }

        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyValue("pg_connection.name"));
        }

        self.tls.validate()
    }
}

/// TLS settings for Postgres connections.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    pub enabled: bool,
}

impl TlsConfig {
    pub fn disabled() -> Self {
        Self {
            trusted_root_certs: String::new(),
            enabled: false,
        }
    }

    /// Fails with [`ValidationError::MissingTrustedRootCerts`] when TLS is enabled without
    /// certificates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts a connection config into driver-specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options targeting the server without selecting a database, used for administrative
    /// statements such as `create database`.
    fn without_db(&self) -> Output;

    /// Options targeting the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(&self.host)
            .username(&self.username)
            .port(self.port)
            .ssl_mode(ssl_mode)
            .ssl_root_cert_from_pem(self.tls.trusted_root_certs.clone().into_bytes())
            .options(SessionOptions::to_key_value_pairs(self.statement_timeout_ms));

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}
