//! Input and output shapes for [`super::analyze`]. These are deliberately
//! distinct from `domain::models` — the engine speaks in feed-shaped values
//! (`user_id`, raw hashtags), the persistence layer in row-shaped ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AnomalyType, MessageFlags, MessageSentiment};

fn default_zero() -> i64 {
    0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedMessageInput {
    pub user_id: String,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default = "default_zero")]
    pub reactions: i64,
    #[serde(default = "default_zero")]
    pub shares: i64,
    #[serde(default = "default_zero")]
    pub views: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    Meta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingTopic {
    pub tag: String,
    pub count: u32,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluenceRankingEntry {
    pub user_id: String,
    pub followers: u64,
    pub engagement_rate: f64,
    pub influence_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub anomaly_detected: bool,
    pub anomaly_type: Option<AnomalyType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment_distribution: MessageSentiment,
    pub engagement_score: f64,
    pub trending_topics: Vec<TrendingTopic>,
    pub influence_ranking: Vec<InfluenceRankingEntry>,
    pub anomaly: AnomalyResult,
    pub flags: MessageFlags,
}
