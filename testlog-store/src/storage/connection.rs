//! Connection Provisioner
//!
//! `TigerStyle`: One timeout and one retry budget, applied to every
//! round-trip regardless of backend or operation.
//!
//! ```text
//! operation ──► ConnectionPolicy::run ──► attempt 1 ──► transient? ──► sleep, attempt 2 ...
//!                                              │                          (≤ retries_max)
//!                                              └──► Ok / permanent error ──► caller
//! ```

use std::future::Future;
use std::time::Duration;

use super::error::{StorageError, StorageResult};
use crate::constants::{
    CONNECTION_RETRY_COUNT_MAX, CONNECTION_RETRY_DELAY_MS_BASE, CONNECTION_RETRY_DELAY_MS_MAX,
    CONNECTION_TIMEOUT_SECS_DEFAULT,
};

// =============================================================================
// ConnectionPolicy
// =============================================================================

/// Timeout and retry policy shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// Per round-trip timeout.
    ///
    /// Default: 30 seconds
    pub timeout: Duration,

    /// Attempts per round-trip, first try included.
    ///
    /// Default: 5
    pub retries_max: u32,

    /// Whether timeouts count as transient.
    ///
    /// Default: true
    pub retry_on_timeout: bool,

    /// First backoff delay in milliseconds (doubles per retry).
    pub retry_delay_ms_base: u64,

    /// Backoff ceiling in milliseconds.
    pub retry_delay_ms_max: u64,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS_DEFAULT),
            retries_max: CONNECTION_RETRY_COUNT_MAX,
            retry_on_timeout: true,
            retry_delay_ms_base: CONNECTION_RETRY_DELAY_MS_BASE,
            retry_delay_ms_max: CONNECTION_RETRY_DELAY_MS_MAX,
        }
    }
}

impl ConnectionPolicy {
    /// Set the per round-trip timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "timeout must be positive");
        self.timeout = timeout;
        self
    }

    /// Set the number of attempts per round-trip.
    #[must_use]
    pub fn with_retries_max(mut self, retries_max: u32) -> Self {
        assert!(retries_max > 0, "retries_max must be positive");
        self.retries_max = retries_max;
        self
    }

    /// Enable or disable retrying timeouts.
    #[must_use]
    pub fn with_retry_on_timeout(mut self, retry_on_timeout: bool) -> Self {
        self.retry_on_timeout = retry_on_timeout;
        self
    }

    /// Set the backoff delays.
    #[must_use]
    pub fn with_retry_delay_ms(mut self, base: u64, max: u64) -> Self {
        assert!(base <= max, "retry delay base must not exceed max");
        self.retry_delay_ms_base = base;
        self.retry_delay_ms_max = max;
        self
    }

    /// Timeout in milliseconds, for error reporting.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    fn should_retry(&self, err: &StorageError) -> bool {
        err.is_transient() && (self.retry_on_timeout || !err.is_timeout())
    }

    /// Run one logical round-trip, retrying transient failures.
    ///
    /// `attempt` is called once per try. Permanent errors and the last
    /// transient error are returned as-is.
    ///
    /// # Errors
    /// Returns the error of the final attempt.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut attempt: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let mut tries = 0;
        let mut delay_ms = self.retry_delay_ms_base;

        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(&err) && tries < self.retries_max => {
                    tracing::warn!(
                        operation,
                        attempt = tries,
                        retries_max = self.retries_max,
                        error = %err,
                        "transient backend error, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = (delay_ms * 2).min(self.retry_delay_ms_max);
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::error!(operation, attempts = tries, error = %err, "retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }
}

// =============================================================================
// HTTP (document store)
// =============================================================================

/// Build the HTTP client used for the document store.
///
/// # Errors
/// Returns `BackendUnreachable` if the TLS backend cannot be initialised.
#[cfg(feature = "elasticsearch")]
pub fn http_client(policy: &ConnectionPolicy) -> StorageResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(policy.timeout)
        .connect_timeout(policy.timeout)
        .build()
        .map_err(|e| StorageError::unreachable(format!("failed to build http client: {e}")))
}

/// Classify a transport error.
#[cfg(feature = "elasticsearch")]
#[must_use]
pub fn map_http_error(err: &reqwest::Error, policy: &ConnectionPolicy) -> StorageError {
    if err.is_timeout() {
        StorageError::timeout(policy.timeout_ms())
    } else if err.is_connect() {
        StorageError::unreachable(format!("connection failed: {err}"))
    } else {
        StorageError::unreachable(err.to_string())
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Open a connection pool with the policy's timeouts, retrying the connect.
///
/// The server-side `statement_timeout` bounds every query by the same
/// timeout the pool uses for acquiring connections.
///
/// # Errors
/// Returns the final connect error once retries are exhausted.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(
    options: sqlx::postgres::PgConnectOptions,
    policy: &ConnectionPolicy,
) -> StorageResult<sqlx::PgPool> {
    use crate::constants::POSTGRES_POOL_CONNECTIONS_MAX;
    use sqlx::postgres::PgPoolOptions;

    let statement_timeout = format!("{}ms", policy.timeout_ms());
    let options = options.options([("statement_timeout", statement_timeout.as_str())]);
    let acquire_timeout = policy.timeout;

    policy
        .run("postgres_connect", || {
            let options = options.clone();
            async move {
                PgPoolOptions::new()
                    .max_connections(POSTGRES_POOL_CONNECTIONS_MAX)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(|e| map_sqlx_error(e, acquire_timeout))
            }
        })
        .await
}

/// Classify a database error.
///
/// Pool/IO failures are transient, statement timeouts are timeouts and an
/// invalid regular expression is a validation error; everything else is a
/// permanent query error.
#[cfg(feature = "postgres")]
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error, timeout: Duration) -> StorageError {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    match err {
        sqlx::Error::PoolTimedOut => StorageError::timeout(timeout_ms),
        sqlx::Error::Io(e) => StorageError::unreachable(e.to_string()),
        sqlx::Error::Tls(e) => StorageError::unreachable(e.to_string()),
        sqlx::Error::PoolClosed => StorageError::unreachable("connection pool closed"),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // query_canceled (statement_timeout)
            Some("57014") => StorageError::timeout(timeout_ms),
            // invalid_regular_expression
            Some("2201B") => StorageError::validation(db.message().to_string()),
            _ => StorageError::query(db.message().to_string()),
        },
        other => StorageError::query(other.to_string()),
    }
}
