//! DST Tests for LogService
//!
//! TigerStyle: Service guarantees checked against the simulated backend,
//! with and without injected faults.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use testlog_store::dst::{FaultConfig, FaultType, SimConfig};
use testlog_store::storage::SimLogBackend;
use testlog_store::{LogId, LogInput, LogService, ProjectId};

// =============================================================================
// Test Helpers
// =============================================================================

fn ts(day: u32, hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(hour, minute, second)
        .unwrap()
}

fn log(id: Option<LogId>, item_id: i64, log_time: NaiveDateTime, message: &str) -> LogInput {
    LogInput {
        id,
        uuid: format!("{}-{message}", id.unwrap_or_default()),
        log_time,
        log_message: message.to_string(),
        item_id,
        launch_id: 11,
        last_modified: log_time,
        log_level: 40000,
        attachment_id: Some(3),
    }
}

fn sim(seed: u64) -> SimLogBackend {
    SimLogBackend::new(SimConfig::with_seed(seed))
}

fn service(backend: &SimLogBackend) -> LogService {
    LogService::with_backend(Arc::new(backend.clone()))
}

// =============================================================================
// Unprovisioned projects
// =============================================================================

#[tokio::test]
async fn dst_unprovisioned_reads_and_deletes_are_empty() {
    let service = service(&sim(42));
    for project in [1 as ProjectId, 7, 42, 1_000_000] {
        assert!(service.get_logs_by_ids(project, &[1, 2, 3]).await.is_empty());
        assert!(service.get_logs_by_test_item(project, 5).await.is_empty());
        assert!(service.search_logs(project, "connection").await.is_empty());
        assert!(service.search_logs_by_pattern(project, ".*").await.is_empty());
        assert_eq!(service.delete_logs(project, &[1]).await, 0);
        assert_eq!(
            service.delete_logs_by_date(project, "2024-06-01", "2024-06-30").await,
            0
        );
        assert_eq!(service.delete_project(project).await, 0);
    }
}

// =============================================================================
// Project lifecycle
// =============================================================================

#[tokio::test]
async fn dst_delete_project_is_idempotent() {
    let backend = sim(42);
    let service = service(&backend);

    assert_eq!(service.index_logs(3, &[log(None, 1, ts(1, 0, 0, 0), "a")]).await, 1);
    assert!(backend.is_provisioned(3));

    assert_eq!(service.delete_project(3).await, 1);
    assert_eq!(service.delete_project(3).await, 0);
    assert!(!backend.is_provisioned(3));
    assert!(backend.lifecycle_policy(3).is_none());
    assert!(service.get_logs_by_test_item(3, 1).await.is_empty());
}

#[tokio::test]
async fn dst_update_policy_never_creates_a_policy() {
    let backend = sim(42);
    let service = service(&backend);

    assert_eq!(service.update_policy(77, 30).await, 0);
    assert!(backend.lifecycle_policy(77).is_none());
    assert!(!backend.is_provisioned(77));
}

// =============================================================================
// Reads after writes
// =============================================================================

#[tokio::test]
async fn dst_explicit_id_round_trip() {
    let service = service(&sim(42));
    let input = log(Some(501), 9, ts(4, 13, 45, 7), "assertion failed: expected 3");

    assert_eq!(service.index_logs(1, &[input.clone()]).await, 1);
    let records = service.get_logs_by_ids(1, &[501]).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], input.clone().into_record(501));

    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["log_time"], "2024-06-04 13:45:07");
}

#[tokio::test]
async fn dst_test_item_read_after_write() {
    let service = service(&sim(42));
    let logs = vec![
        log(None, 8, ts(2, 1, 0, 0), "step 1"),
        log(None, 8, ts(2, 1, 0, 1), "step 2"),
        log(None, 9, ts(2, 1, 0, 2), "other item"),
    ];
    assert_eq!(service.index_logs(5, &logs).await, 3);

    let mut messages: Vec<String> = service
        .get_logs_by_test_item(5, 8)
        .await
        .into_iter()
        .map(|r| r.log_message)
        .collect();
    messages.sort();
    assert_eq!(messages, vec!["step 1", "step 2"]);
}

#[tokio::test]
async fn dst_delete_logs_ignores_unknown_ids() {
    let service = service(&sim(42));
    let logs: Vec<LogInput> = (1..=3)
        .map(|id| log(Some(id), 1, ts(1, 0, 0, 0), "line"))
        .collect();
    assert_eq!(service.index_logs(42, &logs).await, 3);

    assert_eq!(service.delete_logs(42, &[2, 3, 999]).await, 2);
    let left = service.get_logs_by_ids(42, &[1, 2, 3]).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, 1);
}

#[tokio::test]
async fn dst_delete_by_single_date_is_inclusive_at_both_ends() {
    let service = service(&sim(42));
    let logs = vec![
        log(Some(1), 1, ts(9, 23, 59, 59), "day before"),
        log(Some(2), 1, ts(10, 0, 0, 0), "midnight"),
        log(Some(3), 1, ts(10, 23, 59, 59), "last second"),
        log(Some(4), 1, ts(11, 0, 0, 0), "day after"),
    ];
    assert_eq!(service.index_logs(2, &logs).await, 4);

    assert_eq!(
        service.delete_logs_by_date(2, "2024-06-10", "2024-06-10").await,
        2
    );
    let mut ids: Vec<LogId> = service
        .get_logs_by_ids(2, &[1, 2, 3, 4])
        .await
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 4]);
}

#[tokio::test]
async fn dst_search_matches_any_term() {
    let service = service(&sim(42));
    let logs = vec![
        log(Some(1), 1, ts(1, 0, 0, 0), "Connection timeout while fetching"),
        log(Some(2), 1, ts(1, 0, 0, 0), "File not found"),
    ];
    assert_eq!(service.index_logs(7, &logs).await, 2);

    let hits = service.search_logs(7, "connection timeout").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].log_message, "Connection timeout while fetching");
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test]
async fn dst_transient_faults_are_absorbed_by_retries() {
    let backend = sim(42).with_faults(
        FaultConfig::new(FaultType::NetworkTimeout, 1.0)
            .with_filter("read")
            .with_max_injections(2),
    );
    let service = service(&backend);
    service
        .index_logs(1, &[log(Some(1), 1, ts(1, 0, 0, 0), "x")])
        .await;

    assert_eq!(service.get_logs_by_ids(1, &[1]).await.len(), 1);
    assert_eq!(backend.fault_injector().injections(FaultType::NetworkTimeout), 2);
}

#[tokio::test]
async fn dst_exhausted_retries_degrade_to_empty() {
    let backend = sim(42).with_faults(
        FaultConfig::new(FaultType::NetworkConnectionRefused, 1.0).with_filter("read"),
    );
    let service = service(&backend);
    assert_eq!(
        service
            .index_logs(1, &[log(Some(1), 1, ts(1, 0, 0, 0), "x")])
            .await,
        1
    );

    assert!(service.get_logs_by_ids(1, &[1]).await.is_empty());
    assert!(service.search_logs(1, "x").await.is_empty());
}

#[tokio::test]
async fn dst_template_failure_leaves_project_unwritable() {
    let backend = sim(42).with_faults(
        FaultConfig::new(FaultType::TemplateWriteFail, 1.0).with_filter("provision_template"),
    );
    let service = service(&backend);

    assert_eq!(
        service
            .index_logs(4, &[log(None, 1, ts(1, 0, 0, 0), "x")])
            .await,
        0
    );
    assert!(!backend.is_provisioned(4));
    assert!(!backend.has_template(4));
}

#[tokio::test]
async fn dst_random_faults_never_surface_as_panics() {
    let seed = SimConfig::from_env_or_random().seed();
    println!("DST seed: {seed}");
    let backend = SimLogBackend::new(SimConfig::with_seed(seed))
        .with_faults(FaultConfig::new(FaultType::NetworkTimeout, 0.3))
        .with_faults(FaultConfig::new(FaultType::BulkItemReject, 0.2).with_filter("bulk_item"));
    let service = service(&backend);

    let logs: Vec<LogInput> = (1..=50)
        .map(|id| log(Some(id), id % 5, ts(1 + (id as u32 % 20), 0, 0, 0), "payload"))
        .collect();
    let written = service.index_logs(1, &logs).await;
    assert!(written <= 50);

    let read = service.get_logs_by_ids(1, &(1..=50).collect::<Vec<_>>()).await;
    assert!(read.len() as u64 <= written);
    let deleted = service.delete_logs(1, &(1..=50).collect::<Vec<_>>()).await;
    assert!(deleted <= written);
}
