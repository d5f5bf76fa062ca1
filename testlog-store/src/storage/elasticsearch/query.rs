//! Query bodies and paged reads.

use serde_json::{json, Value};

use super::client::EsClient;
use crate::constants::{DOCUMENT_TIMESTAMP_FORMAT, SCROLL_KEEPALIVE, SCROLL_PAGE_SIZE_COUNT};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::record::{DateRange, LogDocument, LogId, LogRecord};

/// One search hit: where it lives and what it holds.
#[derive(Debug, Clone)]
pub(crate) struct Hit {
    pub index: String,
    pub id: LogId,
    pub document: LogDocument,
}

impl Hit {
    pub fn into_record(self) -> LogRecord {
        self.document.into_record(self.id)
    }
}

// =============================================================================
// Query bodies
// =============================================================================

pub(crate) fn ids_query(ids: &[LogId]) -> Value {
    let values: Vec<String> = ids.iter().map(ToString::to_string).collect();
    json!({ "ids": { "values": values } })
}

pub(crate) fn test_item_query(item_id: i64) -> Value {
    json!({ "term": { "item_id": item_id } })
}

pub(crate) fn match_query(query: &str) -> Value {
    json!({
        "match": {
            "log_message": { "query": query, "operator": "or" }
        }
    })
}

pub(crate) fn regexp_query(pattern: &str) -> Value {
    json!({
        "regexp": {
            "log_message": { "value": pattern, "case_insensitive": true }
        }
    })
}

/// Inclusive day range on `log_time`, in the mapping's date format.
pub(crate) fn date_range_query(range: &DateRange) -> Value {
    json!({
        "range": {
            "log_time": {
                "gte": format!("{} 00:00:00", range.start()),
                "lte": format!("{} 23:59:59", range.end()),
                "format": DOCUMENT_TIMESTAMP_FORMAT
            }
        }
    })
}

// =============================================================================
// Hits
// =============================================================================

/// Decode `hits.hits` of a search response.
///
/// Hits whose `_id` is not an integer or whose source does not decode are
/// skipped with a warning rather than failing the whole read.
pub(crate) fn parse_hits(body: &Value) -> StorageResult<Vec<Hit>> {
    let hits = body
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::serialization("search response has no hits array"))?;

    let mut parsed = Vec::with_capacity(hits.len());
    for hit in hits {
        let raw_id = hit.get("_id").and_then(Value::as_str).unwrap_or_default();
        let Ok(id) = raw_id.parse::<LogId>() else {
            tracing::warn!(id = raw_id, "skipping document with non-integer id");
            continue;
        };
        let index = hit
            .get("_index")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let source = hit.get("_source").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<LogDocument>(source) {
            Ok(document) => parsed.push(Hit {
                index,
                id,
                document,
            }),
            Err(e) => tracing::warn!(id, error = %e, "skipping undecodable document"),
        }
    }
    Ok(parsed)
}

fn scroll_id(body: &Value) -> Option<String> {
    body.get("_scroll_id")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

// =============================================================================
// Reads
// =============================================================================

/// One search request, relevance ordered, at most `size` hits.
pub(crate) async fn search(
    client: &EsClient,
    alias: &str,
    query: Value,
    size: usize,
) -> StorageResult<Vec<Hit>> {
    let body = json!({ "size": size, "query": query });
    let response = client
        .post(&format!("{alias}/_search"), &body)
        .await?
        .into_success()?;
    parse_hits(&response.body)
}

/// Page through every match with a scroll, stopping early only at `cap`.
///
/// The scroll context is cleared afterwards, also when a page fails.
pub(crate) async fn scroll(
    client: &EsClient,
    alias: &str,
    query: Value,
    cap: Option<usize>,
) -> StorageResult<Vec<Hit>> {
    let page_size = cap.map_or(SCROLL_PAGE_SIZE_COUNT, |c| c.min(SCROLL_PAGE_SIZE_COUNT));
    let body = json!({ "size": page_size, "query": query, "sort": ["_doc"] });
    let response = client
        .post(&format!("{alias}/_search?scroll={SCROLL_KEEPALIVE}"), &body)
        .await?
        .into_success()?;

    let mut current_id = scroll_id(&response.body);
    let result = collect_pages(client, response.body, &mut current_id, cap).await;

    if let Some(id) = current_id {
        let clear = json!({ "scroll_id": id });
        match client.delete("_search/scroll", Some(&clear)).await {
            Ok(response) if response.is_success() || response.is_not_found() => {}
            Ok(response) => {
                tracing::debug!(reason = %response.error_reason(), "failed to clear scroll");
            }
            Err(e) => tracing::debug!(error = %e, "failed to clear scroll"),
        }
    }
    result
}

async fn collect_pages(
    client: &EsClient,
    first_page: Value,
    current_id: &mut Option<String>,
    cap: Option<usize>,
) -> StorageResult<Vec<Hit>> {
    let mut collected = Vec::new();
    let mut page = first_page;

    loop {
        let raw_count = page
            .get("hits")
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        collected.extend(parse_hits(&page)?);

        if let Some(cap) = cap {
            if collected.len() >= cap {
                collected.truncate(cap);
                break;
            }
        }
        if raw_count == 0 {
            break;
        }
        let Some(id) = current_id.clone() else {
            break;
        };

        let next = json!({ "scroll": SCROLL_KEEPALIVE, "scroll_id": id });
        let response = client.post("_search/scroll", &next).await?.into_success()?;
        if let Some(id) = scroll_id(&response.body) {
            *current_id = Some(id);
        }
        page = response.body;
    }
    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_query_is_inclusive_both_ends() {
        let range = DateRange::parse("2024-05-01", "2024-05-03").unwrap();
        let query = date_range_query(&range);
        assert_eq!(query["range"]["log_time"]["gte"], "2024-05-01 00:00:00");
        assert_eq!(query["range"]["log_time"]["lte"], "2024-05-03 23:59:59");
        assert_eq!(query["range"]["log_time"]["format"], "yyyy-MM-dd HH:mm:ss");
    }

    #[test]
    fn test_ids_query_uses_string_ids() {
        assert_eq!(
            ids_query(&[1, 22]),
            json!({ "ids": { "values": ["1", "22"] } })
        );
    }

    #[test]
    fn test_parse_hits_skips_foreign_documents() {
        let body = json!({
            "hits": { "hits": [
                {
                    "_index": "7_logs-000001",
                    "_id": "5",
                    "_source": {
                        "uuid": "u5",
                        "log_time": "2024-05-01 10:00:00",
                        "log_message": "Connection timeout while fetching",
                        "item_id": 11,
                        "launch_id": 3,
                        "last_modified": "2024-05-01 10:00:00",
                        "log_level": 40000
                    }
                },
                { "_index": "7_logs-000001", "_id": "abc", "_source": {} },
                { "_index": "7_logs-000001", "_id": "6", "_source": { "uuid": "broken" } }
            ] }
        });

        let hits = parse_hits(&body).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, "7_logs-000001");
        let record = hits[0].clone().into_record();
        assert_eq!(record.id, 5);
        assert_eq!(record.item_id, 11);

        assert!(parse_hits(&json!({"took": 1})).is_err());
    }
}
