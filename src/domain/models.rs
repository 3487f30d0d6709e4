//! Entity types mirrored against the relational schema in `db::schema`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub external_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub user_id: String,
    pub correlation_id: String,
    pub created_at: DateTime<Utc>,
    pub request_raw: Option<String>,
    pub engagement_score: Option<f64>,
    pub ranking: Option<f64>,
    pub influence_ranking_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct MessageSentiment {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct MessageFlags {
    pub mbras_employee: bool,
    pub special_pattern: bool,
    pub candidate_awareness: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageAnomaly {
    pub anomaly_detected: bool,
    pub anomaly_type: Option<AnomalyType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    Burst,
    Alternation,
    SynchronizedPosting,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Burst => "burst",
            AnomalyType::Alternation => "alternation",
            AnomalyType::SynchronizedPosting => "synchronized_posting",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "burst" => Some(AnomalyType::Burst),
            "alternation" => Some(AnomalyType::Alternation),
            "synchronized_posting" => Some(AnomalyType::SynchronizedPosting),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Received,
    Queued,
    Processing,
    Processed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Received => "received",
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(ProcessingStatus::Received),
            "queued" => Some(ProcessingStatus::Queued),
            "processing" => Some(ProcessingStatus::Processing),
            "processed" => Some(ProcessingStatus::Processed),
            "failed" => Some(ProcessingStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageProcessing {
    pub message_id: String,
    pub queue_messaging: Option<String>,
    pub processing_success: Option<bool>,
    pub processing_status: ProcessingStatus,
    pub failure_stage: Option<String>,
    pub failed_reason: Option<String>,
    pub elastic_name: Option<String>,
    pub elastic_index_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluenceRankingItem {
    pub id: String,
    pub message_id: String,
    pub external_user_key: String,
    pub followers: i64,
    pub engagement_rate: f64,
    pub influence_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxStatus::Pending),
            "published" => Some(OutboxStatus::Published),
            "failed" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: String,
    pub message_id: String,
    pub correlation_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fully materialized view of a message's analysis-adjacent rows, as
/// returned by `Repository::load_related`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedMessageData {
    pub sentiment: Option<MessageSentiment>,
    pub flags: Option<MessageFlags>,
    pub anomaly: Option<MessageAnomaly>,
    pub processing: Option<MessageProcessing>,
    pub influence_items: Vec<InfluenceRankingItem>,
    pub topics: Vec<Topic>,
}
