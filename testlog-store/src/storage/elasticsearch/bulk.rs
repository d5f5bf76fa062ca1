//! Bulk payloads and per-item outcomes.

use serde_json::{json, Value};

use super::query::Hit;
use crate::storage::error::StorageResult;
use crate::storage::record::{LogDocument, LogId};

/// Tally of one `_bulk` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BulkOutcome {
    pub succeeded: u64,
    pub failed: u64,
    pub first_error: Option<String>,
}

impl BulkOutcome {
    pub fn merge(&mut self, other: BulkOutcome) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        if self.first_error.is_none() {
            self.first_error = other.first_error;
        }
    }
}

/// NDJSON `index` actions targeting the write alias.
pub(crate) fn index_payload(alias: &str, documents: &[(LogId, LogDocument)]) -> StorageResult<String> {
    let mut payload = String::new();
    for (id, document) in documents {
        let action = json!({ "index": { "_index": alias, "_id": id.to_string() } });
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(document)?);
        payload.push('\n');
    }
    Ok(payload)
}

/// NDJSON `delete` actions against the concrete segment holding each hit.
pub(crate) fn delete_payload(hits: &[Hit]) -> StorageResult<String> {
    let mut payload = String::new();
    for hit in hits {
        let action = json!({ "delete": { "_index": hit.index, "_id": hit.id.to_string() } });
        payload.push_str(&serde_json::to_string(&action)?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Count item results of a bulk response.
///
/// An item succeeds when its status is 2xx; for deletes it must also
/// report `"result": "deleted"`, so already-missing documents count as 0.
pub(crate) fn parse_outcome(body: &Value) -> BulkOutcome {
    let mut outcome = BulkOutcome::default();
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        outcome.first_error = Some(format!("bulk response has no items: {body}"));
        return outcome;
    };

    for item in items {
        let Some((action, result)) = item.as_object().and_then(|o| o.iter().next()) else {
            outcome.failed += 1;
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
        let ok = (200..300).contains(&status)
            && (action != "delete"
                || result.get("result").and_then(Value::as_str) == Some("deleted"));

        if ok {
            outcome.succeeded += 1;
        } else if action == "delete" && status == 404 {
            // already gone
        } else {
            outcome.failed += 1;
            if outcome.first_error.is_none() {
                let reason = result
                    .get("error")
                    .map_or_else(|| format!("status {status}"), Value::to_string);
                outcome.first_error = Some(reason);
            }
        }
    }
    outcome
}
