//! Log Backend Trait
//!
//! `TigerStyle`: One contract, identical meaning across backends.
//!
//! # Existence First
//!
//! Read and delete paths check that the project's store exists and return
//! [`StorageError::NotProvisioned`] otherwise. Only `index_logs` may create
//! a store.
//!
//! [`StorageError::NotProvisioned`]: super::error::StorageError::NotProvisioned

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use super::error::StorageResult;
use super::record::{DateRange, LogId, LogInput, LogRecord, ProjectId};

// =============================================================================
// BackendKind
// =============================================================================

/// The closed set of selectable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Document store with native lifecycle policies
    Elasticsearch,
    /// Shared relational table
    Postgres,
}

impl BackendKind {
    /// Every selectable backend.
    pub const ALL: [BackendKind; 2] = [BackendKind::Elasticsearch, BackendKind::Postgres];

    /// Configuration name of this backend.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elasticsearch => "elasticsearch",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend name that is not in [`BackendKind::ALL`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBackendKind(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "elasticsearch" => Ok(Self::Elasticsearch),
            "postgres" => Ok(Self::Postgres),
            _ => Err(UnknownBackendKind(s.to_string())),
        }
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Pattern dialect used by `search_logs_by_pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSyntax {
    /// Lucene regular expressions, anchored, case-insensitive
    LuceneRegexp,
    /// POSIX regular expressions (`~`), unanchored, case-sensitive
    PosixRegex,
    /// Rust `regex` crate syntax, unanchored
    RustRegex,
}

/// Behavior that differs between backends.
///
/// Exposed instead of hidden so callers can tell ranked search from
/// token matching and native retention from scheduled deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// `search_logs` results are ordered by relevance
    pub ranked_search: bool,
    /// `update_policy_keep_logs_days` is backed by an engine feature
    pub native_retention: bool,
    /// Dialect of `search_logs_by_pattern`
    pub pattern_syntax: PatternSyntax,
}

// =============================================================================
// LogBackend
// =============================================================================

/// Storage contract for per-project test logs.
///
/// `TigerStyle`: All operations are async and return explicit errors. The
/// zero/empty sentinels live one layer up, in
/// [`LogService`](crate::service::LogService).
#[async_trait]
pub trait LogBackend: Send + Sync + fmt::Debug {
    /// Which variant this is.
    fn kind(&self) -> BackendKind;

    /// Behavior that differs between variants.
    fn capabilities(&self) -> BackendCapabilities;

    /// Remove the project's store and its lifecycle artifacts.
    ///
    /// Returns 1 if the store existed, 0 otherwise.
    async fn delete_project(&self, project: ProjectId) -> StorageResult<u64>;

    /// Records with the given ids. Missing ids are omitted, order is
    /// unspecified, at most `LOG_RESULTS_COUNT_MAX` records.
    async fn get_logs_by_ids(&self, project: ProjectId, ids: &[LogId])
        -> StorageResult<Vec<LogRecord>>;

    /// Records owned by a test item, at most `LOG_RESULTS_COUNT_MAX`.
    async fn get_logs_by_test_item(
        &self,
        project: ProjectId,
        item_id: i64,
    ) -> StorageResult<Vec<LogRecord>>;

    /// Full-text search on the message, at most `SEARCH_RESULTS_COUNT_MAX`.
    async fn search_logs(&self, project: ProjectId, query: &str) -> StorageResult<Vec<LogRecord>>;

    /// Backend-native pattern search on the message.
    async fn search_logs_by_pattern(
        &self,
        project: ProjectId,
        pattern: &str,
    ) -> StorageResult<Vec<LogRecord>>;

    /// Delete records by id. Returns the number actually deleted.
    async fn delete_logs(&self, project: ProjectId, ids: &[LogId]) -> StorageResult<u64>;

    /// Delete records whose `log_time` falls inside `range` (both ends
    /// inclusive). Returns the number deleted.
    async fn delete_logs_by_date(&self, project: ProjectId, range: DateRange)
        -> StorageResult<u64>;

    /// Write records, provisioning the project's store if needed.
    ///
    /// Returns the number written. Rejected items surface as
    /// `PartialBulkFailure` carrying the written count.
    async fn index_logs(&self, project: ProjectId, logs: &[LogInput]) -> StorageResult<u64>;

    /// Set the retention of an existing policy. Never creates one.
    async fn update_policy_keep_logs_days(
        &self,
        project: ProjectId,
        keep_logs_days: u32,
    ) -> StorageResult<()>;
}
