//! Elasticsearch Backend
//!
//! `TigerStyle`: One rollover-managed index group per project.
//!
//! # Layout
//!
//! ```text
//! <prefix><project>_logs            write alias (reads + writes)
//!   └── <prefix><project>_logs-000001, -000002, ...   rolled over by policy
//! <prefix><project>_logs_template   binds pattern -> mapping + policy
//! <prefix><project>_logs_policy     hot 7d rollover / warm 14d / delete Nd
//! ```
//!
//! Reads resolve through the alias, so every segment is visible. Deletes by
//! id target the concrete segment of each hit.
//!
//! # Known limitations
//!
//! - Writes go through the alias into the head segment. Re-indexing an
//!   explicit id after a rollover leaves the older copy in its segment, so
//!   `get_logs_by_ids` returns both and `delete_logs` counts both.
//! - Project ids must be non-negative; a negative id is a validation error.

mod bulk;
mod client;
mod lifecycle;
mod query;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::backend::{BackendCapabilities, BackendKind, LogBackend, PatternSyntax};
use super::connection::ConnectionPolicy;
use super::error::{StorageError, StorageResult};
use super::record::{DateRange, LogDocument, LogId, LogInput, LogRecord, ProjectId};
use crate::constants::{
    BULK_CHUNK_SIZE_COUNT, LOG_IDS_COUNT_MAX, LOG_RESULTS_COUNT_MAX, SEARCH_QUERY_BYTES_MAX,
    SEARCH_RESULTS_COUNT_MAX,
};
use crate::text::remove_credentials_from_url;
use bulk::BulkOutcome;
use client::EsClient;
use lifecycle::IndexNames;

/// Bits of a generated id below the millisecond timestamp.
const GENERATED_ID_SEQUENCE_BITS: u32 = 20;

/// Document-store backend speaking the Elasticsearch REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchBackend {
    client: EsClient,
    index_prefix: String,
}

impl ElasticsearchBackend {
    /// Create a backend for `host`. No request is made until first use.
    ///
    /// # Errors
    /// Returns an error if `host` is empty or the HTTP client cannot be built.
    pub fn new(
        host: &str,
        index_prefix: impl Into<String>,
        policy: ConnectionPolicy,
    ) -> StorageResult<Self> {
        let client = EsClient::new(host, policy)?;
        let index_prefix = index_prefix.into();
        tracing::info!(
            host = %remove_credentials_from_url(client.base_url()),
            index_prefix = %index_prefix,
            "elasticsearch backend configured"
        );
        Ok(Self {
            client,
            index_prefix,
        })
    }

    /// Names for `project`. A negative id would start an index name with
    /// `-`, which the cluster rejects.
    fn names(&self, project: ProjectId) -> StorageResult<IndexNames> {
        if project < 0 {
            return Err(StorageError::validation(format!(
                "project id {project} cannot name an index"
            )));
        }
        Ok(IndexNames::new(&self.index_prefix, project))
    }

    /// Alias of an existing project, or `NotProvisioned`.
    async fn existing_alias(&self, project: ProjectId) -> StorageResult<String> {
        let names = self.names(project)?;
        if lifecycle::exists(&self.client, &names).await? {
            Ok(names.alias)
        } else {
            Err(StorageError::not_provisioned(names.alias))
        }
    }

    /// Pair every input with its final id.
    ///
    /// Explicit ids are kept; the rest get a time-ordered id
    /// (`millis << 20 | sequence`) so they sort after earlier writes.
    fn assign_ids(project: ProjectId, logs: &[LogInput]) -> Vec<(LogId, LogDocument)> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(0));
        // Leave room for the batch offset inside the sequence bits.
        let sequence_base = i64::from(rand::random::<u16>()) << 3;
        let base = (millis << GENERATED_ID_SEQUENCE_BITS) | sequence_base;

        let mut next = base;
        logs.iter()
            .map(|log| {
                let id = log.id.unwrap_or_else(|| {
                    next += 1;
                    next
                });
                (id, log.to_document(project))
            })
            .collect()
    }
}

fn validate_ids(ids: &[LogId]) -> StorageResult<()> {
    if ids.len() > LOG_IDS_COUNT_MAX {
        return Err(StorageError::validation(format!(
            "{} ids exceed the limit of {LOG_IDS_COUNT_MAX}",
            ids.len()
        )));
    }
    Ok(())
}

fn validate_query(query: &str) -> StorageResult<()> {
    if query.len() > SEARCH_QUERY_BYTES_MAX {
        return Err(StorageError::validation(format!(
            "query of {} bytes exceeds {SEARCH_QUERY_BYTES_MAX}",
            query.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl LogBackend for ElasticsearchBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ranked_search: true,
            native_retention: true,
            pattern_syntax: PatternSyntax::LuceneRegexp,
        }
    }

    async fn delete_project(&self, project: ProjectId) -> StorageResult<u64> {
        lifecycle::delete_project(&self.client, &self.names(project)?).await
    }

    async fn get_logs_by_ids(
        &self,
        project: ProjectId,
        ids: &[LogId],
    ) -> StorageResult<Vec<LogRecord>> {
        validate_ids(ids)?;
        let alias = self.existing_alias(project).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let hits = query::scroll(
            &self.client,
            &alias,
            query::ids_query(ids),
            Some(LOG_RESULTS_COUNT_MAX),
        )
        .await?;
        Ok(hits.into_iter().map(query::Hit::into_record).collect())
    }

    async fn get_logs_by_test_item(
        &self,
        project: ProjectId,
        item_id: i64,
    ) -> StorageResult<Vec<LogRecord>> {
        let alias = self.existing_alias(project).await?;
        let hits = query::scroll(
            &self.client,
            &alias,
            query::test_item_query(item_id),
            Some(LOG_RESULTS_COUNT_MAX),
        )
        .await?;
        Ok(hits.into_iter().map(query::Hit::into_record).collect())
    }

    async fn search_logs(&self, project: ProjectId, query: &str) -> StorageResult<Vec<LogRecord>> {
        validate_query(query)?;
        let alias = self.existing_alias(project).await?;
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let hits = query::search(
            &self.client,
            &alias,
            query::match_query(query),
            SEARCH_RESULTS_COUNT_MAX,
        )
        .await?;
        Ok(hits.into_iter().map(query::Hit::into_record).collect())
    }

    async fn search_logs_by_pattern(
        &self,
        project: ProjectId,
        pattern: &str,
    ) -> StorageResult<Vec<LogRecord>> {
        validate_query(pattern)?;
        let alias = self.existing_alias(project).await?;
        let hits = query::search(
            &self.client,
            &alias,
            query::regexp_query(pattern),
            SEARCH_RESULTS_COUNT_MAX,
        )
        .await?;
        Ok(hits.into_iter().map(query::Hit::into_record).collect())
    }

    async fn delete_logs(&self, project: ProjectId, ids: &[LogId]) -> StorageResult<u64> {
        validate_ids(ids)?;
        let alias = self.existing_alias(project).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let hits = query::scroll(&self.client, &alias, query::ids_query(ids), None).await?;
        let mut total = BulkOutcome::default();
        for chunk in hits.chunks(BULK_CHUNK_SIZE_COUNT) {
            let response = self
                .client
                .bulk(bulk::delete_payload(chunk)?)
                .await?
                .into_success()?;
            total.merge(bulk::parse_outcome(&response.body));
        }
        if total.failed > 0 {
            tracing::warn!(
                alias = %alias,
                deleted = total.succeeded,
                failed = total.failed,
                first_error = ?total.first_error,
                "some deletes failed"
            );
        }
        Ok(total.succeeded)
    }

    async fn delete_logs_by_date(
        &self,
        project: ProjectId,
        range: DateRange,
    ) -> StorageResult<u64> {
        let alias = self.existing_alias(project).await?;
        let body = serde_json::json!({ "query": query::date_range_query(&range) });
        let response = self
            .client
            .post(&format!("{alias}/_delete_by_query?refresh=true"), &body)
            .await?
            .into_success()?;

        let deleted = response
            .body
            .get("deleted")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        let failures = response
            .body
            .get("failures")
            .and_then(serde_json::Value::as_array)
            .map_or(0, Vec::len);
        if failures > 0 {
            tracing::warn!(alias = %alias, deleted, failures, "delete by date partially failed");
        }
        tracing::info!(
            alias = %alias,
            start = %range.start(),
            end = %range.end(),
            deleted,
            "logs deleted by date"
        );
        Ok(deleted)
    }

    async fn index_logs(&self, project: ProjectId, logs: &[LogInput]) -> StorageResult<u64> {
        if logs.is_empty() {
            return Ok(0);
        }
        let names = self.names(project)?;
        if !lifecycle::exists(&self.client, &names).await? {
            lifecycle::provision(&self.client, &names).await?;
        }

        let documents = Self::assign_ids(project, logs);
        let mut total = BulkOutcome::default();
        let mut last_error = None;
        for chunk in documents.chunks(BULK_CHUNK_SIZE_COUNT) {
            let payload = bulk::index_payload(&names.alias, chunk)?;
            let chunk_len = chunk.len() as u64;
            match self.client.bulk(payload).await.and_then(client::EsResponse::into_success) {
                Ok(response) => total.merge(bulk::parse_outcome(&response.body)),
                Err(e) => {
                    tracing::error!(alias = %names.alias, error = %e, documents = chunk_len, "bulk chunk failed");
                    total.failed += chunk_len;
                    last_error = Some(e);
                }
            }
        }

        if total.failed == 0 {
            tracing::debug!(alias = %names.alias, written = total.succeeded, "logs indexed");
            return Ok(total.succeeded);
        }
        tracing::warn!(
            alias = %names.alias,
            written = total.succeeded,
            failed = total.failed,
            first_error = ?total.first_error,
            "bulk write partially failed"
        );
        match last_error {
            Some(e) if total.succeeded == 0 => Err(e),
            _ => Err(StorageError::PartialBulkFailure {
                written: total.succeeded,
                failed: total.failed,
            }),
        }
    }

    async fn update_policy_keep_logs_days(
        &self,
        project: ProjectId,
        keep_logs_days: u32,
    ) -> StorageResult<()> {
        lifecycle::update_keep_logs_days(&self.client, &self.names(project)?, keep_logs_days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(id: Option<LogId>) -> LogInput {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        LogInput {
            id,
            uuid: "u".to_string(),
            log_time: ts,
            log_message: "m".to_string(),
            item_id: 1,
            launch_id: 1,
            last_modified: ts,
            log_level: 20000,
            attachment_id: None,
        }
    }

    #[test]
    fn test_assign_ids_keeps_explicit_and_generates_increasing() {
        let logs = vec![input(Some(3)), input(None), input(None)];
        let assigned = ElasticsearchBackend::assign_ids(7, &logs);

        assert_eq!(assigned[0].0, 3);
        assert!(assigned[1].0 > 0);
        assert!(assigned[2].0 > assigned[1].0);
        assert!(assigned.iter().all(|(_, doc)| doc.project_id == Some(7)));
    }

    #[test]
    fn test_capabilities() {
        let backend =
            ElasticsearchBackend::new("http://localhost:9200", "", ConnectionPolicy::default())
                .unwrap();
        assert_eq!(backend.kind(), BackendKind::Elasticsearch);
        assert!(backend.capabilities().ranked_search);
        assert!(backend.capabilities().native_retention);
    }
}
