//! A thin REST client over Elasticsearch's document and bulk APIs. The
//! teacher has no search-index dependency of its own; this follows the
//! pack's general shape for wrapping a JSON REST API behind a typed client
//! built on `reqwest` + `serde_json`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::config::server::SearchConfig;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search index request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search index returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// One row destined for the bulk `_index` audit path.
#[derive(Debug, Clone)]
pub struct AuditDocument {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct BulkItemResult {
    pub id: String,
    pub success: bool,
    pub error: Option<String>,
}

pub struct SearchIndexWriter {
    client: reqwest::Client,
    base_url: String,
    analysis_index_prefix: String,
    audit_index_prefix: String,
}

impl SearchIndexWriter {
    pub fn new(config: &SearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("reqwest client configuration is static and always valid");
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            analysis_index_prefix: config.analysis_index_prefix.clone(),
            audit_index_prefix: config.audit_index_prefix.clone(),
        }
    }

    pub fn analysis_index_name(&self, timestamp: DateTime<Utc>) -> String {
        day_index_name(&self.analysis_index_prefix, timestamp)
    }

    pub fn audit_index_name(&self, timestamp: DateTime<Utc>) -> String {
        day_index_name(&self.audit_index_prefix, timestamp)
    }

    pub fn analysis_alias(&self) -> &str {
        &self.analysis_index_prefix
    }

    pub fn audit_alias(&self) -> &str {
        &self.audit_index_prefix
    }

    /// Indexes a single analytic document, used by the ingestion consumer.
    pub async fn index_document<T: Serialize>(
        &self,
        index: &str,
        id: &str,
        document: &T,
    ) -> Result<(), SearchError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, index, id);
        let response = self.client.put(&url).json(document).send().await?;
        ensure_success(response).await
    }

    pub async fn ensure_alias(&self, index: &str, alias: &str) -> Result<(), SearchError> {
        let url = format!("{}/{}/_alias/{}", self.base_url, index, alias);
        let response = self.client.put(&url).send().await?;
        ensure_success(response).await
    }

    /// Bulk-indexes audit rows grouped by per-day index. Returns a per-item
    /// outcome so the dispatcher can treat only the failed rows as failed.
    pub async fn bulk_index_audit(&self, documents: &[AuditDocument]) -> Result<Vec<BulkItemResult>, SearchError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut body = String::new();
        for doc in documents {
            let index = self.audit_index_name(doc.timestamp);
            let action = serde_json::json!({ "index": { "_index": index, "_id": doc.id } });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&doc.source.to_string());
            body.push('\n');
        }

        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = ensure_status(response).await?;

        let parsed: serde_json::Value = response.json().await?;
        let items = parsed["items"].as_array().cloned().unwrap_or_default();

        Ok(documents
            .iter()
            .zip(items.iter())
            .map(|(doc, item)| {
                let action = item.get("index").cloned().unwrap_or(serde_json::Value::Null);
                let status = action["status"].as_u64().unwrap_or(500);
                let success = (200..300).contains(&status);
                let error = if success {
                    None
                } else {
                    Some(action["error"].to_string())
                };
                BulkItemResult { id: doc.id.clone(), success, error }
            })
            .collect())
    }
}

fn day_index_name(prefix: &str, timestamp: DateTime<Utc>) -> String {
    format!("{prefix}-{}", timestamp.format("%Y.%m.%d"))
}

async fn ensure_success(response: reqwest::Response) -> Result<(), SearchError> {
    ensure_status(response).await.map(|_| ())
}

async fn ensure_status(response: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(SearchError::Status { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_index_name_formats_as_dotted_date() {
        let ts = DateTime::parse_from_rfc3339("2026-02-20T10:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(day_index_name("feedpulse-messages", ts), "feedpulse-messages-2026.02.20");
    }
}
