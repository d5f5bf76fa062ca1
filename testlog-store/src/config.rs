//! Service Configuration
//!
//! `TigerStyle`: Environment in, validated struct out, fail before serving.
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_TYPE` | `elasticsearch` |
//! | `ES_HOSTS` | `http://elasticsearch:9200` |
//! | `ES_PROJECT_INDEX_PREFIX` | empty |
//! | `LOGGING_LEVEL` | `DEBUG` |
//! | `LOG_FORMAT` | `text` |
//! | `POSTGRES_USER` / `POSTGRES_PASSWORD` | `rpuser` / empty |
//! | `POSTGRES_HOST` / `POSTGRES_PORT` / `POSTGRES_DB` | `postgres` / `5432` / `reportportal` |
//! | `BACKEND_TIMEOUT_SECS` / `BACKEND_RETRIES_MAX` | `30` / `5` |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{CONNECTION_RETRY_COUNT_MAX, CONNECTION_TIMEOUT_SECS_DEFAULT};
use crate::storage::{BackendKind, ConnectionPolicy};

/// Default document-store endpoint.
pub const ES_HOST_DEFAULT: &str = "http://elasticsearch:9200";

// =============================================================================
// Errors
// =============================================================================

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `DATABASE_TYPE` names no known backend
    #[error("unsupported DATABASE_TYPE {value:?}: expected elasticsearch or postgres")]
    UnsupportedBackendType {
        /// The rejected value
        value: String,
    },

    /// A variable could not be parsed
    #[error("invalid {key}={value:?}: {reason}")]
    InvalidValue {
        /// Variable name
        key: &'static str,
        /// The rejected value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Logging settings
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Degraded results and errors
    Warn,
    /// Lifecycle changes
    Info,
    /// Requests, timings and provisioning steps
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Filter directive for this level.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Lenient mapping used for `LOGGING_LEVEL`: `debug` and `info` are
    /// honored, anything else means `warn`.
    #[must_use]
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            _ => Self::Warn,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(format!(
                "invalid log level '{s}': expected error|warn|info|debug|trace"
            )),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Human-readable
    Text,
}

impl LogFormat {
    /// Name of this format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "pretty" => Ok(Self::Text),
            _ => Err(format!("invalid log format '{s}': expected json|text")),
        }
    }
}

// =============================================================================
// PostgresConfig
// =============================================================================

/// Relational store credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Login role
    pub user: String,
    /// Password (never logged)
    pub password: String,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database name
    pub database: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            user: "rpuser".to_string(),
            password: String::new(),
            host: "postgres".to_string(),
            port: 5432,
            database: "reportportal".to_string(),
        }
    }
}

impl fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

// =============================================================================
// ServiceConfig
// =============================================================================

/// Everything needed to build a [`LogService`](crate::service::LogService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Selected backend
    pub backend: BackendKind,
    /// Document-store endpoint
    pub es_host: String,
    /// Prefix of per-project index names and of the relational table
    pub index_prefix: String,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Log output format
    pub log_format: LogFormat,
    /// Relational credentials
    pub postgres: PostgresConfig,
    /// Per round-trip timeout
    pub timeout: Duration,
    /// Attempts per round-trip
    pub retries_max: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Elasticsearch,
            es_host: ES_HOST_DEFAULT.to_string(),
            index_prefix: String::new(),
            log_level: LogLevel::Debug,
            log_format: LogFormat::Text,
            postgres: PostgresConfig::default(),
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS_DEFAULT),
            retries_max: CONNECTION_RETRY_COUNT_MAX,
        }
    }
}

fn validate_index_prefix(prefix: &str) -> Result<(), ConfigError> {
    let valid_chars = prefix
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid_chars {
        return Err(ConfigError::invalid(
            "ES_PROJECT_INDEX_PREFIX",
            prefix,
            "only lower-case letters, digits and '_' are allowed",
        ));
    }
    if prefix.starts_with('_') {
        return Err(ConfigError::invalid(
            "ES_PROJECT_INDEX_PREFIX",
            prefix,
            "must not start with '_'",
        ));
    }
    // Also names the Postgres table, which cannot start with a digit.
    if prefix.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ConfigError::invalid(
            "ES_PROJECT_INDEX_PREFIX",
            prefix,
            "must start with a lower-case letter",
        ));
    }
    Ok(())
}

fn parse_positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let value: T = raw
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, raw, e.to_string()))?;
    if value <= T::default() {
        return Err(ConfigError::invalid(key, raw, "must be positive"));
    }
    Ok(value)
}

impl ServiceConfig {
    /// Read the process environment.
    ///
    /// # Errors
    /// Returns the first invalid variable, `UnsupportedBackendType` for an
    /// unknown `DATABASE_TYPE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup` (the environment, or a map in tests).
    ///
    /// Unset and empty variables take their default.
    ///
    /// # Errors
    /// Returns the first invalid variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let backend = match get("DATABASE_TYPE") {
            Some(value) => value
                .parse::<BackendKind>()
                .map_err(|_| ConfigError::UnsupportedBackendType { value })?,
            None => defaults.backend,
        };

        let es_host = get("ES_HOSTS")
            .map(|host| host.trim().trim_end_matches(['/', '\\']).to_string())
            .unwrap_or(defaults.es_host);

        let index_prefix = get("ES_PROJECT_INDEX_PREFIX")
            .map(|p| p.trim().to_string())
            .unwrap_or_default();
        validate_index_prefix(&index_prefix)?;

        let log_level = get("LOGGING_LEVEL").map_or(defaults.log_level, |v| LogLevel::from_setting(&v));
        let log_format = match get("LOG_FORMAT") {
            Some(v) => v
                .parse()
                .map_err(|reason: String| ConfigError::invalid("LOG_FORMAT", &v, reason))?,
            None => defaults.log_format,
        };

        let pg_defaults = PostgresConfig::default();
        let postgres = PostgresConfig {
            user: get("POSTGRES_USER").unwrap_or(pg_defaults.user),
            password: lookup("POSTGRES_PASSWORD").unwrap_or(pg_defaults.password),
            host: get("POSTGRES_HOST").unwrap_or(pg_defaults.host),
            port: match get("POSTGRES_PORT") {
                Some(v) => parse_positive("POSTGRES_PORT", &v)?,
                None => pg_defaults.port,
            },
            database: get("POSTGRES_DB").unwrap_or(pg_defaults.database),
        };

        let timeout = match get("BACKEND_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(parse_positive("BACKEND_TIMEOUT_SECS", &v)?),
            None => defaults.timeout,
        };
        let retries_max = match get("BACKEND_RETRIES_MAX") {
            Some(v) => parse_positive("BACKEND_RETRIES_MAX", &v)?,
            None => defaults.retries_max,
        };

        Ok(Self {
            backend,
            es_host,
            index_prefix,
            log_level,
            log_format,
            postgres,
            timeout,
            retries_max,
        })
    }

    /// Select the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the document-store endpoint.
    #[must_use]
    pub fn with_es_host(mut self, host: impl Into<String>) -> Self {
        self.es_host = host.into();
        self
    }

    /// Set the index/table prefix.
    ///
    /// # Panics
    /// Panics if the prefix contains characters outside `[a-z0-9_]` or does
    /// not start with a lower-case letter.
    #[must_use]
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        assert!(
            validate_index_prefix(&prefix).is_ok(),
            "invalid index prefix: {prefix:?}"
        );
        self.index_prefix = prefix;
        self
    }

    /// Set the log verbosity.
    #[must_use]
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the relational credentials.
    #[must_use]
    pub fn with_postgres(mut self, postgres: PostgresConfig) -> Self {
        self.postgres = postgres;
        self
    }

    /// Set the per round-trip timeout.
    ///
    /// # Panics
    /// Panics if `timeout` is zero.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "timeout must be positive");
        self.timeout = timeout;
        self
    }

    /// Set the attempts per round-trip.
    ///
    /// # Panics
    /// Panics if `retries_max` is zero.
    #[must_use]
    pub fn with_retries_max(mut self, retries_max: u32) -> Self {
        assert!(retries_max > 0, "retries_max must be positive");
        self.retries_max = retries_max;
        self
    }

    /// Connection policy derived from the timeout and retry settings.
    #[must_use]
    pub fn connection_policy(&self) -> ConnectionPolicy {
        ConnectionPolicy::default()
            .with_timeout(self.timeout)
            .with_retries_max(self.retries_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.backend, BackendKind::Elasticsearch);
        assert_eq!(config.es_host, "http://elasticsearch:9200");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.postgres.user, "rpuser");
        assert_eq!(config.postgres.port, 5432);
        assert_eq!(config.postgres.database, "reportportal");
        assert_eq!(config.connection_policy().timeout, Duration::from_secs(30));
        assert_eq!(config.connection_policy().retries_max, 5);
    }

    #[test]
    fn test_unknown_backend_is_fatal() {
        assert_eq!(
            from_pairs(&[("DATABASE_TYPE", "mongodb")]),
            Err(ConfigError::UnsupportedBackendType {
                value: "mongodb".to_string()
            })
        );
    }

    #[test]
    fn test_postgres_selection_and_credentials() {
        let config = from_pairs(&[
            ("DATABASE_TYPE", "postgres"),
            ("POSTGRES_USER", "logs"),
            ("POSTGRES_PASSWORD", "s3cret"),
            ("POSTGRES_HOST", "db.local"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DB", "testlogs"),
            ("ES_PROJECT_INDEX_PREFIX", "rp_"),
        ])
        .unwrap();
        assert_eq!(config.backend, BackendKind::Postgres);
        assert_eq!(config.index_prefix, "rp_");
        assert_eq!(config.postgres.port, 6543);
        assert_eq!(config.postgres.password, "s3cret");
        assert!(!format!("{:?}", config.postgres).contains("s3cret"));
    }

    #[test]
    fn test_es_host_trailing_separators_stripped() {
        let config = from_pairs(&[("ES_HOSTS", "http://es:9200/\\")]).unwrap();
        assert_eq!(config.es_host, "http://es:9200");
    }

    #[test]
    fn test_logging_level_is_lenient() {
        let level = |v: &str| {
            from_pairs(&[("LOGGING_LEVEL", v)])
                .unwrap()
                .log_level
        };
        assert_eq!(level("DEBUG"), LogLevel::Debug);
        assert_eq!(level("info"), LogLevel::Info);
        assert_eq!(level("ERROR"), LogLevel::Warn);
        assert_eq!(level("verbose"), LogLevel::Warn);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            from_pairs(&[("POSTGRES_PORT", "not-a-port")]),
            Err(ConfigError::InvalidValue { key: "POSTGRES_PORT", .. })
        ));
        assert!(matches!(
            from_pairs(&[("BACKEND_TIMEOUT_SECS", "0")]),
            Err(ConfigError::InvalidValue { key: "BACKEND_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            from_pairs(&[("ES_PROJECT_INDEX_PREFIX", "Bad-Prefix")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            from_pairs(&[("ES_PROJECT_INDEX_PREFIX", "2024_")]),
            Err(ConfigError::InvalidValue { key: "ES_PROJECT_INDEX_PREFIX", .. })
        ));
        assert!(matches!(
            from_pairs(&[("LOG_FORMAT", "xml")]),
            Err(ConfigError::InvalidValue { key: "LOG_FORMAT", .. })
        ));
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfig::default()
            .with_backend(BackendKind::Postgres)
            .with_index_prefix("ci_")
            .with_timeout(Duration::from_secs(5))
            .with_retries_max(2);
        assert_eq!(config.backend, BackendKind::Postgres);
        assert_eq!(config.index_prefix, "ci_");
        assert_eq!(config.connection_policy().timeout, Duration::from_secs(5));
        assert_eq!(config.connection_policy().retries_max, 2);
    }
}
