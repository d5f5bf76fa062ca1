//! Log Service - Backend Selector and Error Boundary
//!
//! `TigerStyle`: Errors stop here. Callers get counts and lists, logs get
//! the details.
//!
//! ```text
//! caller ──► LogService ──► Arc<dyn LogBackend> ──► StorageResult
//!                 │                                      │
//!                 └──── sentinel (0 / empty / partial) ◄─┘  + tracing event
//! ```
//!
//! | error                | result              | level |
//! |----------------------|---------------------|-------|
//! | `NotProvisioned`     | 0 / empty           | debug |
//! | `PartialBulkFailure` | written count       | warn  |
//! | `PolicyNotFound`     | 0                   | warn  |
//! | `Unsupported`        | 0                   | warn  |
//! | anything else        | 0 / empty           | error |

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;

use crate::config::ServiceConfig;
use crate::storage::{
    expiry_range, BackendCapabilities, BackendKind, DateRange, LogBackend, LogId, LogInput,
    LogRecord, ProjectId, StorageError, StorageResult,
};

/// The log persistence service: one backend, chosen once.
#[derive(Debug, Clone)]
pub struct LogService {
    backend: Arc<dyn LogBackend>,
}

impl LogService {
    /// Build the backend selected by `config.backend`.
    ///
    /// The Postgres variant connects eagerly; the Elasticsearch variant makes
    /// no request until first use.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be constructed or connected,
    /// or when the selected variant was compiled out.
    pub async fn connect(config: &ServiceConfig) -> StorageResult<Self> {
        let policy = config.connection_policy();
        let backend: Arc<dyn LogBackend> = match config.backend {
            BackendKind::Elasticsearch => {
                #[cfg(feature = "elasticsearch")]
                {
                    let backend = crate::storage::ElasticsearchBackend::new(
                        &config.es_host,
                        config.index_prefix.clone(),
                        policy,
                    )?;
                    Arc::new(backend) as Arc<dyn LogBackend>
                }
                #[cfg(not(feature = "elasticsearch"))]
                {
                    let _ = policy;
                    return Err(StorageError::Unsupported {
                        operation: "elasticsearch backend",
                    });
                }
            }
            BackendKind::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    let backend = crate::storage::PostgresBackend::connect(
                        &config.postgres,
                        &config.index_prefix,
                        policy,
                    )
                    .await?;
                    Arc::new(backend) as Arc<dyn LogBackend>
                }
                #[cfg(not(feature = "postgres"))]
                {
                    let _ = policy;
                    return Err(StorageError::Unsupported {
                        operation: "postgres backend",
                    });
                }
            }
        };
        tracing::info!(backend = %config.backend, "log service ready");
        Ok(Self::with_backend(backend))
    }

    /// Wrap an already-built backend.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn LogBackend>) -> Self {
        Self { backend }
    }

    /// The selected backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LogBackend> {
        &self.backend
    }

    /// Which variant is serving.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Search and retention behavior of the serving variant.
    #[must_use]
    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.capabilities()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Remove a project's store. 1 if it existed, 0 otherwise.
    pub async fn delete_project(&self, project: ProjectId) -> u64 {
        let result = self.backend.delete_project(project).await;
        count_or_zero("delete_project", project, result)
    }

    /// Records with the given ids (missing ids omitted).
    pub async fn get_logs_by_ids(&self, project: ProjectId, ids: &[LogId]) -> Vec<LogRecord> {
        let start = Instant::now();
        let result = self.backend.get_logs_by_ids(project, ids).await;
        records_or_empty("get_logs_by_ids", project, start, result)
    }

    /// Records owned by a test item.
    pub async fn get_logs_by_test_item(&self, project: ProjectId, item_id: i64) -> Vec<LogRecord> {
        let start = Instant::now();
        let result = self.backend.get_logs_by_test_item(project, item_id).await;
        records_or_empty("get_logs_by_test_item", project, start, result)
    }

    /// Delete records by id. Returns the number deleted.
    pub async fn delete_logs(&self, project: ProjectId, ids: &[LogId]) -> u64 {
        let result = self.backend.delete_logs(project, ids).await;
        count_or_zero("delete_logs", project, result)
    }

    /// Delete records logged between two `YYYY-MM-DD` dates, both inclusive.
    ///
    /// Returns the number deleted; malformed dates give 0.
    pub async fn delete_logs_by_date(
        &self,
        project: ProjectId,
        start_date: &str,
        end_date: &str,
    ) -> u64 {
        let result = match DateRange::parse(start_date, end_date) {
            Ok(range) => self.backend.delete_logs_by_date(project, range).await,
            Err(e) => Err(e),
        };
        count_or_zero("delete_logs_by_date", project, result)
    }

    /// Delete everything older than `keep_logs_days` as of `today`.
    ///
    /// This is how retention is enforced where the store has no native
    /// lifecycle management.
    pub async fn expire_logs(&self, project: ProjectId, keep_logs_days: u32, today: NaiveDate) -> u64 {
        let result = match expiry_range(today, keep_logs_days) {
            Ok(range) => {
                tracing::info!(
                    project,
                    keep_logs_days,
                    before = %range.end(),
                    "expiring logs"
                );
                self.backend.delete_logs_by_date(project, range).await
            }
            Err(e) => Err(e),
        };
        count_or_zero("expire_logs", project, result)
    }

    /// Full-text search on the message.
    pub async fn search_logs(&self, project: ProjectId, query: &str) -> Vec<LogRecord> {
        let start = Instant::now();
        let result = self.backend.search_logs(project, query).await;
        records_or_empty("search_logs", project, start, result)
    }

    /// Pattern search on the message, in the serving variant's syntax.
    pub async fn search_logs_by_pattern(&self, project: ProjectId, pattern: &str) -> Vec<LogRecord> {
        let start = Instant::now();
        let result = self.backend.search_logs_by_pattern(project, pattern).await;
        records_or_empty("search_logs_by_pattern", project, start, result)
    }

    /// Write records, provisioning the store on first write.
    ///
    /// Returns the number written, which is lower than `logs.len()` when
    /// items were rejected.
    pub async fn index_logs(&self, project: ProjectId, logs: &[LogInput]) -> u64 {
        let start = Instant::now();
        let result = self.backend.index_logs(project, logs).await;
        if result.is_ok() {
            tracing::debug!(
                project,
                count = logs.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "index_logs finished"
            );
        }
        count_or_zero("index_logs", project, result)
    }

    /// Change how long a project keeps its logs. 1 on success, 0 otherwise.
    pub async fn update_policy(&self, project: ProjectId, keep_logs_days: u32) -> u64 {
        let result = self
            .backend
            .update_policy_keep_logs_days(project, keep_logs_days)
            .await
            .map(|()| 1);
        count_or_zero("update_policy", project, result)
    }
}

// =============================================================================
// Sentinels
// =============================================================================

fn count_or_zero(operation: &str, project: ProjectId, result: StorageResult<u64>) -> u64 {
    match result {
        Ok(count) => count,
        Err(StorageError::PartialBulkFailure { written, failed }) => {
            tracing::warn!(operation, project, written, failed, "partial bulk failure");
            written
        }
        Err(err) => {
            report(operation, project, &err);
            0
        }
    }
}

fn records_or_empty(
    operation: &str,
    project: ProjectId,
    start: Instant,
    result: StorageResult<Vec<LogRecord>>,
) -> Vec<LogRecord> {
    match result {
        Ok(records) => {
            tracing::debug!(
                operation,
                project,
                count = records.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "read finished"
            );
            records
        }
        Err(err) => {
            report(operation, project, &err);
            Vec::new()
        }
    }
}

fn report(operation: &str, project: ProjectId, err: &StorageError) {
    match err {
        StorageError::NotProvisioned { .. } => {
            tracing::debug!(operation, project, error = %err, "project has no store");
        }
        StorageError::PolicyNotFound { .. } | StorageError::Unsupported { .. } => {
            tracing::warn!(operation, project, error = %err, "operation not applied");
        }
        _ => {
            tracing::error!(operation, project, error = %err, "operation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::{FaultConfig, FaultType, SimConfig};
    use crate::storage::SimLogBackend;

    fn log(id: LogId, item_id: i64, message: &str) -> LogInput {
        log_on(id, item_id, message, 10)
    }

    fn log_on(id: LogId, item_id: i64, message: &str, day: u32) -> LogInput {
        let ts = NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        LogInput {
            id: Some(id),
            uuid: format!("uuid-{id}"),
            log_time: ts,
            log_message: message.to_string(),
            item_id,
            launch_id: 5,
            last_modified: ts,
            log_level: 40000,
            attachment_id: None,
        }
    }

    fn service_over(sim: SimLogBackend) -> LogService {
        LogService::with_backend(Arc::new(sim))
    }

    #[tokio::test]
    async fn test_unprovisioned_project_yields_sentinels() {
        let service = service_over(SimLogBackend::new(SimConfig::with_seed(1)));
        assert!(service.get_logs_by_ids(9, &[1]).await.is_empty());
        assert!(service.get_logs_by_test_item(9, 1).await.is_empty());
        assert!(service.search_logs(9, "anything").await.is_empty());
        assert!(service.search_logs_by_pattern(9, "any.*").await.is_empty());
        assert_eq!(service.delete_logs(9, &[1]).await, 0);
        assert_eq!(service.delete_logs_by_date(9, "2024-01-01", "2024-01-02").await, 0);
        assert_eq!(service.delete_project(9).await, 0);
        assert_eq!(service.update_policy(9, 30).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_dates_yield_zero() {
        let service = service_over(SimLogBackend::new(SimConfig::with_seed(2)));
        service.index_logs(1, &[log(1, 1, "a")]).await;
        assert_eq!(service.delete_logs_by_date(1, "10/03/2024", "2024-03-10").await, 0);
        assert_eq!(service.delete_logs_by_date(1, "2024-03-11", "2024-03-10").await, 0);
        assert_eq!(service.get_logs_by_ids(1, &[1]).await.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_bulk_failure_reports_written_count() {
        let sim = SimLogBackend::new(SimConfig::with_seed(3)).with_faults(
            FaultConfig::new(FaultType::BulkItemReject, 1.0)
                .with_filter("bulk_item")
                .with_max_injections(1),
        );
        let service = service_over(sim);
        let written = service
            .index_logs(1, &[log(1, 1, "a"), log(2, 1, "b"), log(3, 1, "c")])
            .await;
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn test_provisioning_failure_yields_zero() {
        let sim = SimLogBackend::new(SimConfig::with_seed(4)).with_faults(
            FaultConfig::new(FaultType::PolicyWriteFail, 1.0).with_filter("provision_policy"),
        );
        let service = service_over(sim.clone());
        assert_eq!(service.index_logs(1, &[log(1, 1, "a")]).await, 0);
        assert!(!sim.is_provisioned(1));
    }

    #[tokio::test]
    async fn test_update_policy_reports_one_on_success() {
        let sim = SimLogBackend::new(SimConfig::with_seed(5));
        let service = service_over(sim.clone());
        service.index_logs(1, &[log(1, 1, "a")]).await;
        assert_eq!(service.update_policy(1, 30).await, 1);
        let policy = sim.lifecycle_policy(1).unwrap();
        assert_eq!(policy.keep_logs_days(), Some(30));
        assert_eq!(service.update_policy(1, 0).await, 0);
    }

    #[tokio::test]
    async fn test_expire_logs_removes_only_old_records() {
        let service = service_over(SimLogBackend::new(SimConfig::with_seed(7)));
        service
            .index_logs(
                1,
                &[log_on(1, 1, "old", 1), log_on(2, 1, "edge", 10), log_on(3, 1, "new", 11)],
            )
            .await;
        let today = NaiveDate::from_ymd_opt(2024, 3, 20).unwrap();

        // Cutoff is 2024-03-10, inclusive.
        assert_eq!(service.expire_logs(1, 10, today).await, 2);
        let left = service.get_logs_by_ids(1, &[1, 2, 3]).await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 3);
        assert_eq!(service.expire_logs(1, 0, today).await, 0);
    }

    #[tokio::test]
    async fn test_kind_and_capabilities_pass_through() {
        let service = service_over(SimLogBackend::new(SimConfig::with_seed(6)));
        assert_eq!(service.kind(), BackendKind::Elasticsearch);
        assert!(service.capabilities().native_retention);
    }
}
