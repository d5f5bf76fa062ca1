//! Elasticsearch REST client.
//!
//! A thin JSON-over-HTTP layer: every call goes through
//! [`ConnectionPolicy::run`] and only overload/gateway statuses are treated
//! as transient. Everything else is returned to the caller to interpret.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::Value;

use crate::storage::connection::{http_client, map_http_error, ConnectionPolicy};
use crate::storage::error::{StorageError, StorageResult};

/// Status codes that mean "try again later".
const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// A decoded response: status plus JSON body (`Null` when empty).
#[derive(Debug, Clone)]
pub(crate) struct EsResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl EsResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }

    /// `error.type` of an error body.
    pub fn error_type(&self) -> Option<&str> {
        self.body.get("error")?.get("type")?.as_str()
    }

    /// Human-readable failure description.
    pub fn error_reason(&self) -> String {
        let reason = self
            .body
            .get("error")
            .and_then(|e| e.get("reason").or(Some(e)))
            .map_or_else(|| self.body.to_string(), |r| match r {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        format!("status {}: {reason}", self.status.as_u16())
    }

    /// Turn a non-2xx response into a query error.
    pub fn into_success(self) -> StorageResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(StorageError::query(self.error_reason()))
        }
    }
}

/// Shared handle to one Elasticsearch endpoint.
#[derive(Debug, Clone)]
pub(crate) struct EsClient {
    http: reqwest::Client,
    base_url: String,
    policy: ConnectionPolicy,
}

impl EsClient {
    /// Build a client; no request is made.
    pub fn new(base_url: &str, policy: ConnectionPolicy) -> StorageResult<Self> {
        let base_url = base_url.trim_end_matches(['/', '\\']).to_string();
        if base_url.is_empty() {
            return Err(StorageError::validation("elasticsearch host is empty"));
        }
        Ok(Self {
            http: http_client(&policy)?,
            base_url,
            policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read(response: Response, policy: &ConnectionPolicy) -> StorageResult<EsResponse> {
        let status = response.status();
        if TRANSIENT_STATUSES.contains(&status.as_u16()) {
            return Err(StorageError::unreachable(format!(
                "elasticsearch answered {status}"
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| map_http_error(&e, policy))?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(EsResponse { status, body })
    }

    async fn execute<F>(&self, operation: &str, build: F) -> StorageResult<EsResponse>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let this = self;
        self.policy
            .run(operation, move || {
                let request = build(&this.http);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| map_http_error(&e, &this.policy))?;
                    Self::read(response, &this.policy).await
                }
            })
            .await
    }

    /// Send a request with an optional JSON body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> StorageResult<EsResponse> {
        let url = self.url(path);
        let operation = format!("{method} /{}", path.trim_start_matches('/'));
        tracing::debug!(operation = %operation, "elasticsearch request");
        self.execute(&operation, |http| {
            let request = http.request(method.clone(), &url);
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
        .await
    }

    pub async fn get(&self, path: &str) -> StorageResult<EsResponse> {
        self.request(Method::GET, path, None).await
    }

    pub async fn head(&self, path: &str) -> StorageResult<EsResponse> {
        self.request(Method::HEAD, path, None).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> StorageResult<EsResponse> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> StorageResult<EsResponse> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str, body: Option<&Value>) -> StorageResult<EsResponse> {
        self.request(Method::DELETE, path, body).await
    }

    /// `POST /_bulk?refresh=true` with an NDJSON payload.
    pub async fn bulk(&self, ndjson: String) -> StorageResult<EsResponse> {
        let url = self.url("_bulk?refresh=true");
        self.execute("POST /_bulk", |http| {
            http.post(&url)
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(ndjson.clone())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_is_normalized() {
        let client = EsClient::new("http://es:9200/\\", ConnectionPolicy::default()).unwrap();
        assert_eq!(client.base_url(), "http://es:9200");
        assert_eq!(client.url("/_bulk"), "http://es:9200/_bulk");
        assert_eq!(client.url("7_logs"), "http://es:9200/7_logs");

        assert!(EsClient::new("/", ConnectionPolicy::default()).is_err());
    }

    #[test]
    fn test_error_reason() {
        let response = EsResponse {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": {
                    "type": "resource_already_exists_exception",
                    "reason": "index [7_logs-000001] already exists"
                },
                "status": 400
            }),
        };
        assert_eq!(response.error_type(), Some("resource_already_exists_exception"));
        assert_eq!(
            response.error_reason(),
            "status 400: index [7_logs-000001] already exists"
        );
        assert!(response.into_success().is_err());
    }
}
