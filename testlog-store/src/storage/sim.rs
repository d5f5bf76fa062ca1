//! `SimLogBackend` - In-Memory Backend for Testing
//!
//! `TigerStyle`: Deterministic testing with fault injection.
//!
//! Models the document-store behavior: lazy provisioning in three steps
//! (policy, template, head segment), one lifecycle policy per project,
//! token-OR ranked search and regex pattern search. Every step consults the
//! [`FaultInjector`] under a named operation:
//!
//! | operation            | step                                   |
//! |----------------------|----------------------------------------|
//! | `exists`             | store existence check                  |
//! | `provision_policy`   | lifecycle policy creation              |
//! | `provision_template` | template creation                      |
//! | `provision_segment`  | head segment creation                  |
//! | `bulk_item`          | one record of `index_logs`             |
//! | `read`               | id / test-item / search reads          |
//! | `delete`             | every delete path                      |
//! | `policy_read`        | reading the policy before an update    |
//! | `policy_write`       | writing the updated policy             |
//!
//! Transport faults are retried through the [`ConnectionPolicy`] like a real
//! round-trip; every other fault fails the step it hits. Faults without an
//! operation filter apply to every step.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;

use crate::constants::{LOG_RESULTS_COUNT_MAX, SEARCH_RESULTS_COUNT_MAX};
use crate::dst::{DeterministicRng, FaultConfig, FaultInjector, SimConfig};
use crate::text::{split_words, SplitOptions};

use super::backend::{BackendCapabilities, BackendKind, LogBackend, PatternSyntax};
use super::connection::ConnectionPolicy;
use super::error::{StorageError, StorageResult};
use super::record::{DateRange, LogId, LogInput, LogRecord, ProjectId};
use super::retention::{validate_keep_logs_days, LifecyclePolicy};

/// Everything the simulated cluster knows about one project.
#[derive(Debug, Default)]
struct SimProject {
    policy: Option<LifecyclePolicy>,
    template: bool,
    /// `None` until the head segment exists
    records: Option<BTreeMap<LogId, LogRecord>>,
}

// =============================================================================
// SimLogBackend
// =============================================================================

/// In-memory log backend for testing.
///
/// Stands in for the document-store variant: `kind()` reports
/// `Elasticsearch` and retention is native, but patterns are matched with
/// Rust `regex` (see `capabilities()`), not Lucene syntax.
///
/// `TigerStyle`:
/// - Deterministic via `DeterministicRng`
/// - Fault injection via `FaultInjector`
/// - Thread-safe with `RwLock`
#[derive(Debug, Clone)]
pub struct SimLogBackend {
    projects: Arc<RwLock<HashMap<ProjectId, SimProject>>>,
    fault_injector: Arc<FaultInjector>,
    policy: ConnectionPolicy,
    next_id: Arc<AtomicI64>,
}

impl SimLogBackend {
    /// Create a new `SimLogBackend` with given config.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let rng = DeterministicRng::new(config.seed());
        Self {
            projects: Arc::new(RwLock::new(HashMap::new())),
            fault_injector: Arc::new(FaultInjector::new(rng.stream("faults"))),
            policy: ConnectionPolicy::default().with_retry_delay_ms(0, 0),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Add fault configuration.
    ///
    /// # Panics
    /// Panics if the backend has already been cloned.
    #[must_use]
    pub fn with_faults(mut self, config: FaultConfig) -> Self {
        Arc::get_mut(&mut self.fault_injector)
            .expect("cannot add faults after backend is shared")
            .register(config);
        self
    }

    /// Replace the retry policy applied to simulated round-trips.
    #[must_use]
    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Get fault injector for inspection.
    #[must_use]
    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.fault_injector
    }

    /// Whether the project's head segment exists.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn is_provisioned(&self, project: ProjectId) -> bool {
        self.projects
            .read()
            .unwrap()
            .get(&project)
            .is_some_and(|p| p.records.is_some())
    }

    /// The project's lifecycle policy, if one exists.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn lifecycle_policy(&self, project: ProjectId) -> Option<LifecyclePolicy> {
        self.projects
            .read()
            .unwrap()
            .get(&project)
            .and_then(|p| p.policy.clone())
    }

    /// Whether the project's template exists.
    ///
    /// # Panics
    /// Panics if the lock is poisoned.
    #[must_use]
    pub fn has_template(&self, project: ProjectId) -> bool {
        self.projects
            .read()
            .unwrap()
            .get(&project)
            .is_some_and(|p| p.template)
    }

    fn check_fault(&self, operation: &str) -> StorageResult<()> {
        match self.fault_injector.should_inject(operation) {
            None => Ok(()),
            Some(fault) if fault.is_transient() => Err(StorageError::simulated_fault(format!(
                "{} during {operation}",
                fault.as_str()
            ))),
            Some(fault) => Err(StorageError::query(format!(
                "simulated {} during {operation}",
                fault.as_str()
            ))),
        }
    }

    /// One simulated round-trip: faults are checked, transient ones retried.
    async fn round_trip(&self, operation: &'static str) -> StorageResult<()> {
        self.policy
            .run(operation, move || future::ready(self.check_fault(operation)))
            .await
    }

    async fn require_store(&self, project: ProjectId) -> StorageResult<()> {
        self.round_trip("exists").await?;
        if self.is_provisioned(project) {
            Ok(())
        } else {
            Err(StorageError::not_provisioned(format!("{project}_logs")))
        }
    }

    async fn provision(&self, project: ProjectId) -> StorageResult<()> {
        let step = |step: &'static str| move |e: StorageError| StorageError::provisioning(step, e.to_string());

        self.round_trip("provision_policy")
            .await
            .map_err(step("policy"))?;
        self.projects
            .write()
            .unwrap()
            .entry(project)
            .or_default()
            .policy
            .get_or_insert_with(LifecyclePolicy::default);

        self.round_trip("provision_template")
            .await
            .map_err(step("template"))?;
        self.projects.write().unwrap().entry(project).or_default().template = true;

        self.round_trip("provision_segment")
            .await
            .map_err(step("segment"))?;
        self.projects
            .write()
            .unwrap()
            .entry(project)
            .or_default()
            .records
            .get_or_insert_with(BTreeMap::new);

        tracing::info!(project, "simulated project provisioned");
        Ok(())
    }

    /// Records of a project matching `keep`, in id order.
    fn select<F>(&self, project: ProjectId, keep: F) -> Vec<LogRecord>
    where
        F: Fn(&LogRecord) -> bool,
    {
        self.projects
            .read()
            .unwrap()
            .get(&project)
            .and_then(|p| p.records.as_ref())
            .map(|records| records.values().filter(|r| keep(r)).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LogBackend for SimLogBackend {
    /// The document-store variant this backend simulates.
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ranked_search: true,
            native_retention: true,
            pattern_syntax: PatternSyntax::RustRegex,
        }
    }

    async fn delete_project(&self, project: ProjectId) -> StorageResult<u64> {
        self.round_trip("delete").await?;
        let removed = self.projects.write().unwrap().remove(&project);
        let existed = removed.is_some_and(|p| p.records.is_some());
        tracing::info!(project, existed, "simulated project deleted");
        Ok(u64::from(existed))
    }

    async fn get_logs_by_ids(
        &self,
        project: ProjectId,
        ids: &[LogId],
    ) -> StorageResult<Vec<LogRecord>> {
        self.require_store(project).await?;
        self.round_trip("read").await?;
        let wanted: HashSet<LogId> = ids.iter().copied().collect();
        let mut records = self.select(project, |r| wanted.contains(&r.id));
        records.truncate(LOG_RESULTS_COUNT_MAX);
        Ok(records)
    }

    async fn get_logs_by_test_item(
        &self,
        project: ProjectId,
        item_id: i64,
    ) -> StorageResult<Vec<LogRecord>> {
        self.require_store(project).await?;
        self.round_trip("read").await?;
        let mut records = self.select(project, |r| r.item_id == item_id);
        records.sort_by_key(|r| (r.log_time, r.id));
        records.truncate(LOG_RESULTS_COUNT_MAX);
        Ok(records)
    }

    async fn search_logs(&self, project: ProjectId, query: &str) -> StorageResult<Vec<LogRecord>> {
        self.require_store(project).await?;
        self.round_trip("read").await?;

        let options = SplitOptions::search_terms();
        let terms: HashSet<String> = split_words(query, &options).into_iter().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, LogRecord)> = self
            .select(project, |_| true)
            .into_iter()
            .filter_map(|record| {
                let words: HashSet<String> =
                    split_words(&record.log_message, &options).into_iter().collect();
                let score = terms.intersection(&words).count();
                (score > 0).then_some((score, record))
            })
            .collect();
        scored.sort_by(|(a_score, a), (b_score, b)| b_score.cmp(a_score).then(a.id.cmp(&b.id)));
        scored.truncate(SEARCH_RESULTS_COUNT_MAX);
        Ok(scored.into_iter().map(|(_, record)| record).collect())
    }

    async fn search_logs_by_pattern(
        &self,
        project: ProjectId,
        pattern: &str,
    ) -> StorageResult<Vec<LogRecord>> {
        self.require_store(project).await?;
        let regex = Regex::new(pattern)
            .map_err(|e| StorageError::validation(format!("invalid pattern: {e}")))?;
        self.round_trip("read").await?;
        let mut records = self.select(project, |r| regex.is_match(&r.log_message));
        records.truncate(SEARCH_RESULTS_COUNT_MAX);
        Ok(records)
    }

    async fn delete_logs(&self, project: ProjectId, ids: &[LogId]) -> StorageResult<u64> {
        self.require_store(project).await?;
        self.round_trip("delete").await?;
        let mut projects = self.projects.write().unwrap();
        let Some(records) = projects.get_mut(&project).and_then(|p| p.records.as_mut()) else {
            return Ok(0);
        };
        let unique: HashSet<LogId> = ids.iter().copied().collect();
        let deleted = unique
            .into_iter()
            .filter(|id| records.remove(id).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn delete_logs_by_date(
        &self,
        project: ProjectId,
        range: DateRange,
    ) -> StorageResult<u64> {
        self.require_store(project).await?;
        self.round_trip("delete").await?;
        let mut projects = self.projects.write().unwrap();
        let Some(records) = projects.get_mut(&project).and_then(|p| p.records.as_mut()) else {
            return Ok(0);
        };
        let before = records.len();
        records.retain(|_, r| !range.contains(&r.log_time));
        Ok((before - records.len()) as u64)
    }

    async fn index_logs(&self, project: ProjectId, logs: &[LogInput]) -> StorageResult<u64> {
        if logs.is_empty() {
            return Ok(0);
        }
        self.round_trip("exists").await?;
        if !self.is_provisioned(project) {
            self.provision(project).await?;
        }

        let mut written = 0_u64;
        let mut failed = 0_u64;
        for log in logs {
            if self.check_fault("bulk_item").is_err() {
                failed += 1;
                continue;
            }
            let id = match log.id {
                Some(id) => {
                    self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                    id
                }
                None => self.next_id.fetch_add(1, Ordering::SeqCst),
            };
            let mut projects = self.projects.write().unwrap();
            if let Some(records) = projects.get_mut(&project).and_then(|p| p.records.as_mut()) {
                records.insert(id, log.clone().into_record(id));
                written += 1;
            }
        }

        if failed > 0 {
            tracing::warn!(project, written, failed, "simulated bulk items rejected");
            return Err(StorageError::PartialBulkFailure { written, failed });
        }
        Ok(written)
    }

    async fn update_policy_keep_logs_days(
        &self,
        project: ProjectId,
        keep_logs_days: u32,
    ) -> StorageResult<()> {
        validate_keep_logs_days(keep_logs_days)?;
        self.round_trip("policy_read").await?;
        let Some(mut policy) = self.lifecycle_policy(project) else {
            return Err(StorageError::policy_not_found(format!("{project}_logs_policy")));
        };
        policy.apply_keep_logs_days(keep_logs_days)?;

        self.round_trip("policy_write").await?;
        if let Some(entry) = self.projects.write().unwrap().get_mut(&project) {
            entry.policy = Some(policy);
        }
        tracing::info!(project, keep_logs_days, "simulated retention updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::FaultType;
    use chrono::NaiveDate;

    fn log(id: Option<LogId>, item_id: i64, day: u32, message: &str) -> LogInput {
        let ts = NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        LogInput {
            id,
            uuid: format!("uuid-{message}"),
            log_time: ts,
            log_message: message.to_string(),
            item_id,
            launch_id: 1,
            last_modified: ts,
            log_level: 40000,
            attachment_id: None,
        }
    }

    fn backend() -> SimLogBackend {
        SimLogBackend::new(SimConfig::with_seed(42))
    }

    #[tokio::test]
    async fn test_reads_before_provisioning_are_not_provisioned() {
        let sim = backend();
        assert!(matches!(
            sim.get_logs_by_test_item(1, 1).await,
            Err(StorageError::NotProvisioned { .. })
        ));
        assert!(matches!(
            sim.delete_logs(1, &[1]).await,
            Err(StorageError::NotProvisioned { .. })
        ));
        assert!(!sim.is_provisioned(1));
    }

    #[tokio::test]
    async fn test_index_provisions_bundle() {
        let sim = backend();
        let written = sim
            .index_logs(3, &[log(None, 1, 1, "a"), log(None, 1, 1, "b")])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert!(sim.is_provisioned(3));
        assert!(sim.has_template(3));
        assert!(sim.lifecycle_policy(3).is_some());
    }

    #[tokio::test]
    async fn test_generated_ids_do_not_collide_with_explicit() {
        let sim = backend();
        sim.index_logs(1, &[log(Some(10), 1, 1, "explicit")])
            .await
            .unwrap();
        sim.index_logs(1, &[log(None, 1, 1, "generated")])
            .await
            .unwrap();

        let records = sim.get_logs_by_test_item(1, 1).await.unwrap();
        let ids: Vec<LogId> = records.iter().map(|r| r.id).collect();
        assert!(ids.contains(&10));
        assert!(ids.contains(&11));
    }

    #[tokio::test]
    async fn test_search_ranks_by_matched_terms() {
        let sim = backend();
        sim.index_logs(
            7,
            &[
                log(Some(1), 1, 1, "timeout"),
                log(Some(2), 1, 1, "Connection timeout while fetching"),
                log(Some(3), 1, 1, "File not found"),
            ],
        )
        .await
        .unwrap();

        let found = sim.search_logs(7, "connection timeout").await.unwrap();
        let ids: Vec<LogId> = found.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_validation_error() {
        let sim = backend();
        sim.index_logs(1, &[log(None, 1, 1, "x")]).await.unwrap();
        assert!(matches!(
            sim.search_logs_by_pattern(1, "(unclosed").await,
            Err(StorageError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_template_fault_fails_provisioning_at_template_step() {
        let sim = backend().with_faults(
            FaultConfig::new(FaultType::TemplateWriteFail, 1.0).with_filter("provision_template"),
        );
        let result = sim.index_logs(5, &[log(None, 1, 1, "x")]).await;
        assert!(matches!(
            result,
            Err(StorageError::ProvisioningFailure { step: "template", .. })
        ));
        assert!(!sim.is_provisioned(5));
    }

    #[tokio::test]
    async fn test_transient_faults_are_retried() {
        let sim = backend().with_faults(
            FaultConfig::new(FaultType::NetworkTimeout, 1.0)
                .with_filter("exists")
                .with_max_injections(2),
        );
        let written = sim.index_logs(5, &[log(None, 1, 1, "x")]).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(sim.fault_injector().injections(FaultType::NetworkTimeout), 2);
    }

    #[tokio::test]
    async fn test_bulk_item_rejects_report_partial_count() {
        let sim = backend().with_faults(
            FaultConfig::new(FaultType::BulkItemReject, 1.0)
                .with_filter("bulk_item")
                .with_max_injections(1),
        );
        let result = sim
            .index_logs(
                5,
                &[log(None, 1, 1, "a"), log(None, 1, 1, "b"), log(None, 1, 1, "c")],
            )
            .await;
        assert_eq!(
            result,
            Err(StorageError::PartialBulkFailure {
                written: 2,
                failed: 1
            })
        );
    }

    #[tokio::test]
    async fn test_update_policy_requires_existing_policy() {
        let sim = backend();
        assert!(matches!(
            sim.update_policy_keep_logs_days(9, 30).await,
            Err(StorageError::PolicyNotFound { .. })
        ));
        assert!(sim.lifecycle_policy(9).is_none());

        sim.index_logs(9, &[log(None, 1, 1, "x")]).await.unwrap();
        sim.update_policy_keep_logs_days(9, 30).await.unwrap();
        assert_eq!(sim.lifecycle_policy(9).unwrap().keep_logs_days(), Some(30));
    }
}
