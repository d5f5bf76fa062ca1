//! PostgresBackend - Shared Relational Table
//!
//! `TigerStyle`: One table for every project, isolation by `WHERE`, every
//! user value bound as a parameter.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PostgresBackend                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (statement_timeout = policy timeout)     │
//! │  Table: <prefix>logs (all projects)                          │
//! │  Index: item_id, (project_id, log_time), trigram, tsvector   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS <prefix>logs (
//!     id BIGSERIAL PRIMARY KEY,
//!     uuid TEXT NOT NULL,
//!     log_time TIMESTAMP NOT NULL,
//!     log_message TEXT NOT NULL,
//!     item_id BIGINT NOT NULL,
//!     launch_id BIGINT NOT NULL,
//!     project_id BIGINT NOT NULL,
//!     last_modified TIMESTAMP NOT NULL,
//!     log_level INTEGER NOT NULL,
//!     attachment_id BIGINT
//! );
//! ```
//!
//! Retention has no engine support here: `update_policy_keep_logs_days` is
//! unsupported and expiry is a scheduled `delete_logs_by_date` over
//! [`expiry_range`](super::retention::expiry_range).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::query_builder::Separated;
use sqlx::{Executor, Postgres, QueryBuilder, Row};

use super::backend::{BackendCapabilities, BackendKind, LogBackend, PatternSyntax};
use super::connection::{connect_postgres, map_sqlx_error, ConnectionPolicy};
use super::error::{StorageError, StorageResult};
use super::record::{DateRange, LogId, LogInput, LogRecord, ProjectId};
use crate::config::PostgresConfig;
use crate::constants::{
    BULK_CHUNK_SIZE_COUNT, LOG_IDS_COUNT_MAX, LOG_RESULTS_COUNT_MAX, POSTGRES_IDENTIFIER_BYTES_MAX,
    POSTGRES_TABLE_NAME_BASE, SEARCH_QUERY_BYTES_MAX, SEARCH_RESULTS_COUNT_MAX,
};
use crate::text::{split_words, SplitOptions};

const COLUMNS: &str = "id, uuid, log_time, log_message, item_id, launch_id, last_modified, \
                       log_level, attachment_id";

/// Duplicate-object codes raised when two callers create the same schema
/// object at once: `unique_violation`, `duplicate_table`, `duplicate_object`.
const DUPLICATE_OBJECT_CODES: [&str; 3] = ["23505", "42P07", "42710"];

/// Build the table name for a prefix, checking it is a plain identifier.
///
/// # Errors
/// Returns a validation error if the result is not `[a-z_][a-z0-9_]*` or
/// longer than a Postgres identifier.
pub fn table_name(prefix: &str) -> StorageResult<String> {
    let name = format!("{prefix}{POSTGRES_TABLE_NAME_BASE}");
    let first_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let rest_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !first_ok || !rest_ok || name.len() > POSTGRES_IDENTIFIER_BYTES_MAX {
        return Err(StorageError::validation(format!(
            "invalid table name {name:?}: prefix must be lower-case letters, digits or '_'"
        )));
    }
    Ok(name)
}

fn limit(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

// =============================================================================
// PostgresBackend
// =============================================================================

/// Relational backend over one shared table.
#[derive(Clone, Debug)]
pub struct PostgresBackend {
    pool: PgPool,
    table: String,
    policy: ConnectionPolicy,
    schema_ready: Arc<AtomicBool>,
}

impl PostgresBackend {
    /// Connect with discrete credentials.
    ///
    /// # Errors
    /// Returns an error for an invalid table prefix or when the connect
    /// fails after all retries.
    pub async fn connect(
        config: &PostgresConfig,
        table_prefix: &str,
        policy: ConnectionPolicy,
    ) -> StorageResult<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            user = %config.user,
            "connecting to postgres"
        );
        let pool = connect_postgres(options, &policy).await?;
        Self::from_pool(pool, table_prefix, policy)
    }

    /// Connect with a `postgres://` URL.
    ///
    /// # Errors
    /// Returns an error for a malformed URL, an invalid table prefix or a
    /// failed connect.
    pub async fn connect_url(
        url: &str,
        table_prefix: &str,
        policy: ConnectionPolicy,
    ) -> StorageResult<Self> {
        let options = PgConnectOptions::from_str(url)
            .map_err(|e| StorageError::validation(format!("invalid postgres url: {e}")))?;
        let pool = connect_postgres(options, &policy).await?;
        Self::from_pool(pool, table_prefix, policy)
    }

    /// Wrap an existing pool. The schema is created lazily on first write.
    ///
    /// # Errors
    /// Returns a validation error for an invalid table prefix.
    pub fn from_pool(
        pool: PgPool,
        table_prefix: &str,
        policy: ConnectionPolicy,
    ) -> StorageResult<Self> {
        Ok(Self {
            pool,
            table: table_name(table_prefix)?,
            policy,
            schema_ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Name of the shared table.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn timeout(&self) -> Duration {
        self.policy.timeout
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    async fn execute_step(&self, step: &'static str, sql: &str) -> StorageResult<()> {
        let pool = &self.pool;
        let timeout = self.timeout();
        let result = self
            .policy
            .run(step, move || async move {
                // Unprepared: the index step holds several statements.
                match pool.execute(sql).await {
                    Ok(_) => Ok(()),
                    Err(sqlx::Error::Database(db))
                        if db
                            .code()
                            .is_some_and(|code| DUPLICATE_OBJECT_CODES.contains(&&*code)) =>
                    {
                        Ok(())
                    }
                    Err(e) => Err(map_sqlx_error(e, timeout)),
                }
            })
            .await;
        result.map_err(|e| StorageError::provisioning(step, e.to_string()))
    }

    /// Create extension, table and indexes once per process.
    async fn ensure_schema(&self) -> StorageResult<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let t = &self.table;

        self.execute_step("extension", "CREATE EXTENSION IF NOT EXISTS pg_trgm")
            .await?;
        self.execute_step(
            "table",
            &format!(
                r"
                CREATE TABLE IF NOT EXISTS {t} (
                    id BIGSERIAL PRIMARY KEY,
                    uuid TEXT NOT NULL,
                    log_time TIMESTAMP NOT NULL,
                    log_message TEXT NOT NULL,
                    item_id BIGINT NOT NULL,
                    launch_id BIGINT NOT NULL,
                    project_id BIGINT NOT NULL,
                    last_modified TIMESTAMP NOT NULL,
                    log_level INTEGER NOT NULL,
                    attachment_id BIGINT
                )
                "
            ),
        )
        .await?;
        self.execute_step(
            "indexes",
            &format!(
                r"
                CREATE INDEX IF NOT EXISTS {t}_item_id_idx ON {t} (item_id);
                CREATE INDEX IF NOT EXISTS {t}_project_time_idx ON {t} (project_id, log_time);
                CREATE INDEX IF NOT EXISTS {t}_message_trgm_idx ON {t} USING GIN (log_message gin_trgm_ops);
                CREATE INDEX IF NOT EXISTS {t}_message_fts_idx ON {t} USING GIN (to_tsvector('simple', log_message));
                "
            ),
        )
        .await?;

        self.schema_ready.store(true, Ordering::Release);
        tracing::info!(table = %t, "log table provisioned");
        Ok(())
    }

    /// Fail with `NotProvisioned` when the table does not exist yet.
    async fn require_table(&self) -> StorageResult<()> {
        if self.schema_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let pool = &self.pool;
        let table = self.table.as_str();
        let timeout = self.timeout();
        let exists: bool = self
            .policy
            .run("table_exists", move || async move {
                sqlx::query_scalar("SELECT to_regclass($1::text) IS NOT NULL")
                    .bind(table)
                    .fetch_one(pool)
                    .await
                    .map_err(|e| map_sqlx_error(e, timeout))
            })
            .await?;
        if exists {
            Ok(())
        } else {
            Err(StorageError::not_provisioned(&self.table))
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn fetch_records<'q, F>(&self, operation: &str, build: F) -> StorageResult<Vec<LogRecord>>
    where
        F: Fn() -> Query<'q, Postgres, PgArguments> + Send,
    {
        let pool = &self.pool;
        let timeout = self.timeout();
        let rows = self
            .policy
            .run(operation, move || {
                let query = build();
                async move {
                    query
                        .fetch_all(pool)
                        .await
                        .map_err(|e| map_sqlx_error(e, timeout))
                }
            })
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn execute_counted<'q, F>(&self, operation: &str, build: F) -> StorageResult<u64>
    where
        F: Fn() -> Query<'q, Postgres, PgArguments> + Send,
    {
        let pool = &self.pool;
        let timeout = self.timeout();
        self.policy
            .run(operation, move || {
                let query = build();
                async move {
                    query
                        .execute(pool)
                        .await
                        .map(|done| done.rows_affected())
                        .map_err(|e| map_sqlx_error(e, timeout))
                }
            })
            .await
    }

    /// Upsert rows that carry their own id.
    ///
    /// A conflicting row is only rewritten when it belongs to the same project.
    fn upsert_builder(&self, project: ProjectId, chunk: &[LogInput]) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {} (id, uuid, log_time, log_message, item_id, launch_id, project_id, \
             last_modified, log_level, attachment_id) ",
            self.table
        ));
        builder.push_values(chunk, |mut row, log| {
            row.push_bind(log.id);
            push_fields(&mut row, project, log);
        });
        builder.push(format!(
            " ON CONFLICT (id) DO UPDATE SET \
             uuid = EXCLUDED.uuid, log_time = EXCLUDED.log_time, \
             log_message = EXCLUDED.log_message, item_id = EXCLUDED.item_id, \
             launch_id = EXCLUDED.launch_id, last_modified = EXCLUDED.last_modified, \
             log_level = EXCLUDED.log_level, attachment_id = EXCLUDED.attachment_id \
             WHERE {}.project_id = EXCLUDED.project_id",
            self.table
        ));
        builder
    }

    /// Plain insert for rows that take the next sequence value.
    ///
    /// No conflict clause: a sequence collision must fail, not overwrite.
    fn insert_builder(&self, project: ProjectId, chunk: &[LogInput]) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "INSERT INTO {} (uuid, log_time, log_message, item_id, launch_id, project_id, \
             last_modified, log_level, attachment_id) ",
            self.table
        ));
        builder.push_values(chunk, |mut row, log| push_fields(&mut row, project, log));
        builder
    }

    /// Move the id sequence past explicitly inserted ids. Never moves it back.
    async fn advance_sequence(&self) -> StorageResult<()> {
        let sql = format!(
            "WITH s AS (SELECT pg_get_serial_sequence($1, 'id')::regclass AS seq) \
             SELECT setval(s.seq, GREATEST(\
                 COALESCE((SELECT MAX(id) FROM {}), 1), \
                 COALESCE(pg_sequence_last_value(s.seq), 1))) \
             FROM s",
            self.table
        );
        let table = self.table.clone();
        self.fetch_scalar_i64("advance_sequence", &sql, table).await?;
        Ok(())
    }

    async fn insert_chunks<F>(&self, operation: &str, project: ProjectId, logs: &[LogInput], build: F) -> ChunkOutcome
    where
        F: Fn(&Self, ProjectId, &[LogInput]) -> QueryBuilder<'static, Postgres> + Sync,
    {
        let pool = &self.pool;
        let timeout = self.timeout();
        let mut outcome = ChunkOutcome::default();
        for chunk in logs.chunks(BULK_CHUNK_SIZE_COUNT) {
            let result = self
                .policy
                .run(operation, || {
                    let mut builder = build(self, project, chunk);
                    async move {
                        builder
                            .build()
                            .execute(pool)
                            .await
                            .map(|done| done.rows_affected())
                            .map_err(|e| map_sqlx_error(e, timeout))
                    }
                })
                .await;
            match result {
                Ok(rows) => outcome.written += rows,
                Err(e) => {
                    tracing::error!(table = %self.table, rows = chunk.len(), error = %e, "insert chunk failed");
                    outcome.failed += chunk.len() as u64;
                    outcome.last_error = Some(e);
                }
            }
        }
        outcome
    }

    async fn fetch_scalar_i64(&self, operation: &str, sql: &str, bind: String) -> StorageResult<i64> {
        let pool = &self.pool;
        let timeout = self.timeout();
        self.policy
            .run(operation, || {
                let bind = bind.clone();
                async move {
                    sqlx::query_scalar::<_, i64>(sql)
                        .bind(bind)
                        .fetch_one(pool)
                        .await
                        .map_err(|e| map_sqlx_error(e, timeout))
                }
            })
            .await
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

/// Parse a database row into a LogRecord.
fn row_to_record(row: &PgRow) -> StorageResult<LogRecord> {
    let get_err = |e: sqlx::Error| StorageError::serialization(e.to_string());
    let whole_secs = |ts: NaiveDateTime| ts.with_nanosecond(0).unwrap_or(ts);

    let log_time: NaiveDateTime = row.try_get("log_time").map_err(get_err)?;
    let last_modified: NaiveDateTime = row.try_get("last_modified").map_err(get_err)?;

    Ok(LogRecord {
        id: row.try_get("id").map_err(get_err)?,
        uuid: row.try_get("uuid").map_err(get_err)?,
        log_time: whole_secs(log_time),
        log_message: row.try_get("log_message").map_err(get_err)?,
        item_id: row.try_get("item_id").map_err(get_err)?,
        launch_id: row.try_get("launch_id").map_err(get_err)?,
        last_modified: whole_secs(last_modified),
        log_level: row.try_get("log_level").map_err(get_err)?,
        attachment_id: row.try_get("attachment_id").map_err(get_err)?,
    })
}

fn check_ids(ids: &[LogId]) -> StorageResult<()> {
    if ids.len() > LOG_IDS_COUNT_MAX {
        return Err(StorageError::validation(format!(
            "{} ids exceed the limit of {LOG_IDS_COUNT_MAX}",
            ids.len()
        )));
    }
    Ok(())
}

fn check_query(query: &str) -> StorageResult<()> {
    if query.len() > SEARCH_QUERY_BYTES_MAX {
        return Err(StorageError::validation(format!(
            "query of {} bytes exceeds {SEARCH_QUERY_BYTES_MAX}",
            query.len()
        )));
    }
    Ok(())
}

/// Per-batch tally across insert chunks.
#[derive(Debug, Default)]
struct ChunkOutcome {
    written: u64,
    failed: u64,
    last_error: Option<StorageError>,
}

fn push_fields(row: &mut Separated<'_, 'static, Postgres, &'static str>, project: ProjectId, log: &LogInput) {
    row.push_bind(log.uuid.clone())
        .push_bind(log.log_time)
        .push_bind(log.log_message.clone())
        .push_bind(log.item_id)
        .push_bind(log.launch_id)
        .push_bind(project)
        .push_bind(log.last_modified)
        .push_bind(log.log_level)
        .push_bind(log.attachment_id);
}

/// Keep the last input for every explicit id; one statement cannot upsert
/// the same row twice.
fn dedupe_explicit_ids(logs: &[LogInput]) -> Vec<LogInput> {
    let mut last_position: HashMap<LogId, usize> = HashMap::new();
    for (position, log) in logs.iter().enumerate() {
        if let Some(id) = log.id {
            last_position.insert(id, position);
        }
    }
    logs.iter()
        .enumerate()
        .filter(|(position, log)| {
            log.id
                .map_or(true, |id| last_position.get(&id) == Some(position))
        })
        .map(|(_, log)| log.clone())
        .collect()
}

// =============================================================================
// LogBackend Implementation
// =============================================================================

#[async_trait]
impl LogBackend for PostgresBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            ranked_search: true,
            native_retention: false,
            pattern_syntax: PatternSyntax::PosixRegex,
        }
    }

    async fn delete_project(&self, project: ProjectId) -> StorageResult<u64> {
        self.require_table().await?;
        let sql = format!("DELETE FROM {} WHERE project_id = $1", self.table);
        let deleted = self
            .execute_counted("delete_project", || sqlx::query(&sql).bind(project))
            .await?;
        tracing::info!(project, rows = deleted, "project rows deleted");
        Ok(u64::from(deleted > 0))
    }

    async fn get_logs_by_ids(
        &self,
        project: ProjectId,
        ids: &[LogId],
    ) -> StorageResult<Vec<LogRecord>> {
        check_ids(ids)?;
        self.require_table().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE project_id = $1 AND id = ANY($2) LIMIT $3",
            self.table
        );
        self.fetch_records("get_logs_by_ids", || {
            sqlx::query(&sql)
                .bind(project)
                .bind(ids.to_vec())
                .bind(limit(LOG_RESULTS_COUNT_MAX))
        })
        .await
    }

    async fn get_logs_by_test_item(
        &self,
        project: ProjectId,
        item_id: i64,
    ) -> StorageResult<Vec<LogRecord>> {
        self.require_table().await?;
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE project_id = $1 AND item_id = $2 \
             ORDER BY log_time, id LIMIT $3",
            self.table
        );
        self.fetch_records("get_logs_by_test_item", || {
            sqlx::query(&sql)
                .bind(project)
                .bind(item_id)
                .bind(limit(LOG_RESULTS_COUNT_MAX))
        })
        .await
    }

    async fn search_logs(&self, project: ProjectId, query: &str) -> StorageResult<Vec<LogRecord>> {
        check_query(query)?;
        self.require_table().await?;
        let terms = split_words(query, &SplitOptions::search_terms());
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        // Each term is quoted as a tsquery literal and OR-joined.
        let sql = format!(
            "WITH q AS (
                 SELECT to_tsquery('simple', array_to_string(
                     ARRAY(SELECT quote_literal(term) FROM unnest($2::text[]) AS term), ' | ')) AS tsq
             )
             SELECT {COLUMNS} FROM {}, q
             WHERE project_id = $1 AND to_tsvector('simple', log_message) @@ q.tsq
             ORDER BY ts_rank(to_tsvector('simple', log_message), q.tsq) DESC, id
             LIMIT $3",
            self.table
        );
        self.fetch_records("search_logs", || {
            sqlx::query(&sql)
                .bind(project)
                .bind(terms.clone())
                .bind(limit(SEARCH_RESULTS_COUNT_MAX))
        })
        .await
    }

    async fn search_logs_by_pattern(
        &self,
        project: ProjectId,
        pattern: &str,
    ) -> StorageResult<Vec<LogRecord>> {
        check_query(pattern)?;
        self.require_table().await?;
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE project_id = $1 AND log_message ~ $2 ORDER BY id LIMIT $3",
            self.table
        );
        self.fetch_records("search_logs_by_pattern", || {
            sqlx::query(&sql)
                .bind(project)
                .bind(pattern.to_string())
                .bind(limit(SEARCH_RESULTS_COUNT_MAX))
        })
        .await
    }

    async fn delete_logs(&self, project: ProjectId, ids: &[LogId]) -> StorageResult<u64> {
        check_ids(ids)?;
        self.require_table().await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND id = ANY($2)",
            self.table
        );
        self.execute_counted("delete_logs", || {
            sqlx::query(&sql)
                .bind(project)
                .bind(ids.to_vec())
        })
        .await
    }

    async fn delete_logs_by_date(
        &self,
        project: ProjectId,
        range: DateRange,
    ) -> StorageResult<u64> {
        self.require_table().await?;
        let start = range.start().and_time(NaiveTime::MIN);
        let end_exclusive = range
            .end()
            .succ_opt()
            .ok_or_else(|| StorageError::validation("end date out of range"))?
            .and_time(NaiveTime::MIN);
        let sql = format!(
            "DELETE FROM {} WHERE project_id = $1 AND log_time >= $2 AND log_time < $3",
            self.table
        );
        let deleted = self
            .execute_counted("delete_logs_by_date", || {
                sqlx::query(&sql)
                    .bind(project)
                    .bind(start)
                    .bind(end_exclusive)
            })
            .await?;
        tracing::info!(
            project,
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
        self.ensure_schema().await?;

        let (explicit, generated): (Vec<LogInput>, Vec<LogInput>) = dedupe_explicit_ids(logs)
            .into_iter()
            .partition(|log| log.id.is_some());

        let upserted = self
            .insert_chunks("index_logs", project, &explicit, Self::upsert_builder)
            .await;
        if upserted.written > 0 {
            if let Err(e) = self.advance_sequence().await {
                tracing::warn!(table = %self.table, error = %e, "failed to advance id sequence");
            }
        }
        let inserted = self
            .insert_chunks("index_logs", project, &generated, Self::insert_builder)
            .await;

        let written = upserted.written + inserted.written;
        let failed = upserted.failed + inserted.failed;
        let last_error = inserted.last_error.or(upserted.last_error);
        match last_error {
            None => {
                tracing::debug!(project, written, "logs inserted");
                Ok(written)
            }
            Some(e) if written == 0 => Err(e),
            Some(_) => Err(StorageError::PartialBulkFailure { written, failed }),
        }
    }

    async fn update_policy_keep_logs_days(
        &self,
        _project: ProjectId,
        _keep_logs_days: u32,
    ) -> StorageResult<()> {
        Err(StorageError::Unsupported {
            operation: "update_policy_keep_logs_days",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(id: Option<LogId>, message: &str) -> LogInput {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        LogInput {
            id,
            uuid: "u".to_string(),
            log_time: ts,
            log_message: message.to_string(),
            item_id: 1,
            launch_id: 1,
            last_modified: ts,
            log_level: 20000,
            attachment_id: None,
        }
    }

    #[test]
    fn test_table_name_validation() {
        assert_eq!(table_name("").unwrap(), "logs");
        assert_eq!(table_name("rp_").unwrap(), "rp_logs");
        assert!(table_name("rp-").is_err());
        assert!(table_name("1rp_").is_err());
        assert!(table_name("logs; DROP TABLE logs; --").is_err());
        assert!(table_name(&"x".repeat(60)).is_err());
    }

    #[test]
    fn test_dedupe_explicit_ids_keeps_last() {
        let logs = vec![
            input(Some(1), "first"),
            input(None, "generated"),
            input(Some(1), "second"),
            input(None, "generated again"),
        ];
        let deduped = dedupe_explicit_ids(&logs);
        let messages: Vec<&str> = deduped.iter().map(|l| l.log_message.as_str()).collect();
        assert_eq!(messages, vec!["generated", "second", "generated again"]);
    }
}
