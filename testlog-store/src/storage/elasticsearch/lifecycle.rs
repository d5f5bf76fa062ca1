//! Per-project provisioning bundle and its removal.
//!
//! ```text
//! provision:  policy ──► template ──► head segment (write alias)
//! delete:     segments ──► template ──► policy
//! ```
//!
//! Both directions tolerate concurrent callers: duplicate creates are
//! swallowed and missing artifacts are skipped.

use serde_json::{json, Value};

use super::client::EsClient;
use crate::constants::{DOCUMENT_TIMESTAMP_FORMAT, INDEX_FIRST_SEGMENT_SUFFIX, INDEX_NAME_SUFFIX};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::record::ProjectId;
use crate::storage::retention::LifecyclePolicy;

// =============================================================================
// Naming
// =============================================================================

/// Every name derived from one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexNames {
    /// Rollover alias used for reads and writes
    pub alias: String,
    /// First physical segment
    pub first_segment: String,
    /// Index template
    pub template: String,
    /// Pattern matched by the template
    pub pattern: String,
    /// Lifecycle policy
    pub policy: String,
}

impl IndexNames {
    pub fn new(prefix: &str, project: ProjectId) -> Self {
        let alias = format!("{prefix}{project}{INDEX_NAME_SUFFIX}");
        Self {
            first_segment: format!("{alias}{INDEX_FIRST_SEGMENT_SUFFIX}"),
            template: format!("{alias}_template"),
            pattern: format!("{alias}-*"),
            policy: format!("{alias}_policy"),
            alias,
        }
    }
}

// =============================================================================
// Existence
// =============================================================================

/// Whether the project's alias resolves.
pub(crate) async fn exists(client: &EsClient, names: &IndexNames) -> StorageResult<bool> {
    let response = client.head(&names.alias).await?;
    if response.is_success() {
        Ok(true)
    } else if response.is_not_found() {
        Ok(false)
    } else {
        Err(StorageError::query(response.error_reason()))
    }
}

// =============================================================================
// Provisioning
// =============================================================================

fn template_body(names: &IndexNames) -> Value {
    let date = json!({ "type": "date", "format": DOCUMENT_TIMESTAMP_FORMAT });
    json!({
        "index_patterns": [names.pattern],
        "template": {
            "settings": {
                "index.lifecycle.name": names.policy,
                "index.lifecycle.rollover_alias": names.alias
            },
            "mappings": {
                "properties": {
                    "uuid": { "type": "keyword" },
                    "log_time": date,
                    "log_message": { "type": "text" },
                    "item_id": { "type": "keyword" },
                    "launch_id": { "type": "keyword" },
                    "project_id": { "type": "keyword" },
                    "last_modified": date,
                    "log_level": { "type": "integer" },
                    "attachment_id": { "type": "keyword" }
                }
            }
        }
    })
}

fn step_error(step: &'static str) -> impl Fn(StorageError) -> StorageError {
    move |e| StorageError::provisioning(step, e.to_string())
}

async fn ensure_policy(client: &EsClient, names: &IndexNames) -> StorageResult<()> {
    let path = format!("_ilm/policy/{}", names.policy);
    let existing = client.get(&path).await.map_err(step_error("policy"))?;
    if existing.is_success() {
        tracing::debug!(policy = %names.policy, "lifecycle policy already present");
        return Ok(());
    }
    if !existing.is_not_found() {
        return Err(StorageError::provisioning("policy", existing.error_reason()));
    }

    let body = LifecyclePolicy::default().to_request_body();
    let response = client.put(&path, &body).await.map_err(step_error("policy"))?;
    if !response.is_success() {
        return Err(StorageError::provisioning("policy", response.error_reason()));
    }
    tracing::debug!(policy = %names.policy, "lifecycle policy created");
    Ok(())
}

async fn ensure_template(client: &EsClient, names: &IndexNames) -> StorageResult<()> {
    let path = format!("_index_template/{}", names.template);
    let existing = client.head(&path).await.map_err(step_error("template"))?;
    if existing.is_success() {
        tracing::debug!(template = %names.template, "index template already present");
        return Ok(());
    }

    let response = client
        .put(&format!("{path}?create=true"), &template_body(names))
        .await
        .map_err(step_error("template"))?;
    if response.is_success() {
        tracing::debug!(template = %names.template, "index template created");
        return Ok(());
    }
    if response.error_reason().contains("already exists") {
        tracing::debug!(template = %names.template, "index template created concurrently");
        return Ok(());
    }
    Err(StorageError::provisioning("template", response.error_reason()))
}

async fn ensure_segment(client: &EsClient, names: &IndexNames) -> StorageResult<()> {
    let body = json!({
        "aliases": {
            names.alias.as_str(): { "is_write_index": true }
        }
    });
    let response = client
        .put(&names.first_segment, &body)
        .await
        .map_err(step_error("segment"))?;
    if response.is_success() {
        tracing::debug!(segment = %names.first_segment, "head segment created");
        return Ok(());
    }
    if response.error_type() == Some("resource_already_exists_exception") {
        tracing::debug!(segment = %names.first_segment, "head segment created concurrently");
        return Ok(());
    }
    Err(StorageError::provisioning("segment", response.error_reason()))
}

/// Create policy, template and head segment, in that order.
///
/// Stops at the first failing step and reports it.
pub(crate) async fn provision(client: &EsClient, names: &IndexNames) -> StorageResult<()> {
    ensure_policy(client, names).await?;
    ensure_template(client, names).await?;
    ensure_segment(client, names).await?;
    tracing::info!(alias = %names.alias, "project index provisioned");
    Ok(())
}

// =============================================================================
// Removal
// =============================================================================

/// Delete one metadata artifact, logging the outcome. Never fails.
async fn remove_artifact(client: &EsClient, kind: &'static str, path: &str) {
    match client.delete(path, None).await {
        Ok(response) if response.is_success() => {
            tracing::info!(artifact = kind, path, "deleted");
        }
        Ok(response) if response.is_not_found() => {
            tracing::debug!(artifact = kind, path, "already absent");
        }
        Ok(response) => {
            tracing::warn!(artifact = kind, path, reason = %response.error_reason(), "cleanup failed");
        }
        Err(e) => tracing::warn!(artifact = kind, path, error = %e, "cleanup failed"),
    }
}

/// Delete every segment behind the alias. Returns 1 when any existed.
async fn remove_segments(client: &EsClient, names: &IndexNames) -> StorageResult<u64> {
    let resolved = client.get(&format!("_alias/{}", names.alias)).await?;
    if resolved.is_not_found() {
        tracing::debug!(alias = %names.alias, "no segments to delete");
        return Ok(0);
    }
    let resolved = resolved.into_success()?;
    let segments: Vec<&str> = resolved
        .body
        .as_object()
        .map(|indices| indices.keys().map(String::as_str).collect())
        .unwrap_or_default();
    if segments.is_empty() {
        return Ok(0);
    }
    let joined = segments.join(",");
    client.delete(&joined, None).await?.into_success()?;
    tracing::info!(alias = %names.alias, segments = %joined, "project segments deleted");
    Ok(1)
}

/// Remove the project's segments, then its template, then its policy.
///
/// Each step runs regardless of the one before it. The result reflects the
/// segment step only: 1 when segments existed and were deleted, its error
/// when that deletion failed.
pub(crate) async fn delete_project(client: &EsClient, names: &IndexNames) -> StorageResult<u64> {
    let removed = remove_segments(client, names).await;
    if let Err(ref e) = removed {
        tracing::warn!(alias = %names.alias, error = %e, "segment deletion failed, cleaning metadata anyway");
    }

    remove_artifact(client, "template", &format!("_index_template/{}", names.template)).await;
    remove_artifact(client, "policy", &format!("_ilm/policy/{}", names.policy)).await;
    removed
}

// =============================================================================
// Policy update
// =============================================================================

/// Read-modify-write of the project's lifecycle policy.
///
/// Not transactional: two concurrent updates race and the last write wins.
pub(crate) async fn update_keep_logs_days(
    client: &EsClient,
    names: &IndexNames,
    keep_logs_days: u32,
) -> StorageResult<()> {
    let path = format!("_ilm/policy/{}", names.policy);
    let response = client.get(&path).await?;
    if response.is_not_found() {
        return Err(StorageError::policy_not_found(&names.policy));
    }
    let response = response.into_success()?;

    let stored = response
        .body
        .get(&names.policy)
        .and_then(|entry| entry.get("policy"))
        .cloned()
        .ok_or_else(|| StorageError::policy_not_found(&names.policy))?;

    let mut policy = LifecyclePolicy::from_document(stored)?;
    let previous = policy.keep_logs_days();
    policy.apply_keep_logs_days(keep_logs_days)?;

    client
        .put(&path, &policy.to_request_body())
        .await?
        .into_success()?;
    tracing::info!(
        policy = %names.policy,
        previous_days = ?previous,
        keep_logs_days,
        "retention updated"
    );
    Ok(())
}
