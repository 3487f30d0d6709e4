//! The ingestion consumer (C5): drains the broker, normalizes each envelope,
//! upserts the analysis via C2, indexes a search document, and always ACKs.
//!
//! Wired the same way `LapinPublisher` opens its channel (`messaging::
//! publisher`), but on the consuming side: declare the same topology, set
//! `prefetch=1`, and fold the delivery stream with `futures::StreamExt`
//! instead of the teacher's `tokio::time::interval` tick loop, since a
//! broker subscription is push- not poll-driven.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, ExchangeKind};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::server::BrokerConfig;
use crate::db::{Repository, RepositoryError};
use crate::domain::{InfluenceRankingItem, MessageAnomaly, MessageFlags, MessageSentiment, Patch, ProcessingStatus};
use crate::engine::{AnomalyResult, InfluenceRankingEntry, TrendingTopic};
use crate::messaging::{EventEnvelope, EVENT_ANALYZE_FEED_COMPLETED};
use crate::search::SearchIndexWriter;

use super::metrics::WorkerMetrics;

const MAX_FAILED_REASON_LEN: usize = 2000;

pub struct IngestionConsumer {
    repo: Repository,
    search: Arc<SearchIndexWriter>,
    config: BrokerConfig,
    metrics: Arc<WorkerMetrics>,
}

#[derive(Debug, Deserialize)]
struct FlatPayload {
    sentiment_distribution: MessageSentiment,
    #[serde(default)]
    engagement_score: f64,
    #[serde(default)]
    trending_topics: Vec<TrendingTopic>,
    #[serde(default)]
    influence_ranking: Vec<InfluenceRankingEntry>,
    #[serde(flatten)]
    anomaly: AnomalyResult,
    #[serde(default)]
    flags: MessageFlags,
}

#[derive(Debug, Deserialize)]
struct NestedPayload {
    analysis: NestedAnalysis,
}

#[derive(Debug, Deserialize)]
struct NestedAnalysis {
    sentiment_distribution: MessageSentiment,
    #[serde(default)]
    engagement_score: f64,
    #[serde(default)]
    trending_topics: Vec<TrendingTopic>,
    #[serde(default)]
    influence_ranking: Vec<InfluenceRankingEntry>,
    #[serde(default)]
    anomaly: AnomalyResult,
    #[serde(default)]
    flags: MessageFlags,
}

struct NormalizedPayload {
    sentiment: MessageSentiment,
    engagement_score: f64,
    topics: Vec<String>,
    influence: Vec<InfluenceRankingEntry>,
    anomaly: AnomalyResult,
    flags: MessageFlags,
}

impl NormalizedPayload {
    fn from_envelope(envelope: &EventEnvelope) -> Option<Self> {
        if envelope.event_name == EVENT_ANALYZE_FEED_COMPLETED {
            let nested: NestedPayload = serde_json::from_value(envelope.payload.clone()).ok()?;
            Some(Self {
                sentiment: nested.analysis.sentiment_distribution,
                engagement_score: nested.analysis.engagement_score,
                topics: nested.analysis.trending_topics.into_iter().map(|t| t.tag).collect(),
                influence: nested.analysis.influence_ranking,
                anomaly: nested.analysis.anomaly,
                flags: nested.analysis.flags,
            })
        } else {
            let flat: FlatPayload = serde_json::from_value(envelope.payload.clone()).ok()?;
            Some(Self {
                sentiment: flat.sentiment_distribution,
                engagement_score: flat.engagement_score,
                topics: flat.trending_topics.into_iter().map(|t| t.tag).collect(),
                influence: flat.influence_ranking,
                anomaly: flat.anomaly,
                flags: flat.flags,
            })
        }
    }
}

impl IngestionConsumer {
    pub fn new(repo: Repository, search: Arc<SearchIndexWriter>, config: BrokerConfig, metrics: Arc<WorkerMetrics>) -> Self {
        Self { repo, search, config, metrics }
    }

    /// Connects, declares the shared topology, and folds the delivery
    /// stream forever. Reconnects with a short backoff if the connection
    /// drops; never returns under normal operation.
    pub async fn run(self) {
        loop {
            if let Err(err) = self.run_once().await {
                error!(error = %err, "ingestion consumer connection lost, reconnecting");
                self.metrics.record_error("ingestion_consumer");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        }
    }

    async fn run_once(&self) -> Result<(), lapin::Error> {
        let connection = Connection::connect(&self.config.amqp_url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &self.config.events_queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.config.events_queue,
                &self.config.exchange,
                &self.config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let mut consumer = channel
            .basic_consume(
                &self.config.events_queue,
                "feedpulse-ingestion-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!("ingestion consumer subscribed");
        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            self.handle_delivery(&delivery.data).await;
            delivery.ack(BasicAckOptions::default()).await?;
        }
        Ok(())
    }

    async fn handle_delivery(&self, body: &[u8]) {
        let Some(envelope) = EventEnvelope::parse(body) else {
            warn!("dropping delivery with unparseable envelope body");
            return;
        };
        if !envelope.is_supported() {
            warn!(event_name = %envelope.event_name, "dropping delivery with unsupported event name");
            return;
        }

        let correlation_id = envelope.correlation_id.trim();
        if correlation_id.is_empty() || correlation_id.len() > 64 {
            warn!("dropping delivery with missing or oversized correlation_id");
            return;
        }

        let message_id = match self.mark_processing(correlation_id).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!(correlation_id, "no message found for correlation_id, dropping");
                return;
            }
            Err(err) => {
                error!(error = %err, correlation_id, "failed to mark message processing");
                self.metrics.record_error("ingestion_consumer");
                return;
            }
        };

        if let Err(reason) = self.process(&envelope, &message_id).await {
            self.metrics.record_error("ingestion_consumer");
            let now = Utc::now();
            let truncated: String = reason.chars().take(MAX_FAILED_REASON_LEN).collect();
            if let Err(err) = self
                .repo
                .update_processing(
                    self.repo.pool(),
                    &message_id,
                    Some(ProcessingStatus::Failed),
                    Patch::Unset,
                    Patch::from(false),
                    Patch::from("consumer".to_string()),
                    Patch::from(truncated),
                    Patch::Unset,
                    Patch::Unset,
                    now,
                )
                .await
            {
                error!(error = %err, message_id, "failed to record consumer failure");
            }
        } else {
            self.metrics.add_processed_items("ingestion_consumer", 1);
        }
    }

    async fn mark_processing(&self, correlation_id: &str) -> Result<Option<String>, RepositoryError> {
        let Some(message) = self.repo.get_message_by_correlation_id(self.repo.pool(), correlation_id).await? else {
            return Ok(None);
        };
        self.repo
            .update_processing(
                self.repo.pool(),
                &message.id,
                Some(ProcessingStatus::Processing),
                Patch::Unset,
                Patch::Unset,
                Patch::Unset,
                Patch::Unset,
                Patch::Unset,
                Patch::Unset,
                Utc::now(),
            )
            .await?;
        Ok(Some(message.id))
    }

    async fn process(&self, envelope: &EventEnvelope, message_id: &str) -> Result<(), String> {
        let normalized = NormalizedPayload::from_envelope(envelope)
            .ok_or_else(|| "envelope payload did not match a supported analysis shape".to_string())?;

        self.repo
            .update_message_engagement(self.repo.pool(), message_id, normalized.engagement_score)
            .await
            .map_err(|e| e.to_string())?;
        self.repo
            .upsert_sentiment(self.repo.pool(), message_id, normalized.sentiment)
            .await
            .map_err(|e| e.to_string())?;
        self.repo
            .upsert_flags(self.repo.pool(), message_id, normalized.flags)
            .await
            .map_err(|e| e.to_string())?;
        self.repo
            .upsert_anomaly(
                self.repo.pool(),
                message_id,
                &MessageAnomaly { anomaly_detected: normalized.anomaly.anomaly_detected, anomaly_type: normalized.anomaly.anomaly_type },
            )
            .await
            .map_err(|e| e.to_string())?;

        let influence_items: Vec<InfluenceRankingItem> = normalized
            .influence
            .iter()
            .map(|entry| InfluenceRankingItem {
                id: Uuid::new_v4().to_string(),
                message_id: message_id.to_string(),
                external_user_key: entry.user_id.clone(),
                followers: entry.followers as i64,
                engagement_rate: entry.engagement_rate,
                influence_score: entry.influence_score,
            })
            .collect();

        let mut tx = self.repo.begin().await.map_err(|e| e.to_string())?;
        self.repo.replace_influence_items(&mut tx, message_id, &influence_items).await.map_err(|e| e.to_string())?;
        self.repo.replace_topics(&mut tx, message_id, &normalized.topics).await.map_err(|e| e.to_string())?;
        tx.commit().await.map_err(|e| e.to_string())?;

        let (elastic_name, elastic_index_name) = self.index_document(envelope, message_id, &normalized).await?;

        self.repo
            .update_processing(
                self.repo.pool(),
                message_id,
                Some(ProcessingStatus::Processed),
                Patch::Unset,
                Patch::from(true),
                Patch::Set(None),
                Patch::Set(None),
                Patch::from(elastic_name),
                Patch::from(elastic_index_name),
                Utc::now(),
            )
            .await
            .map_err(|e| e.to_string())?;

        Ok(())
    }

    async fn index_document(
        &self,
        envelope: &EventEnvelope,
        message_id: &str,
        normalized: &NormalizedPayload,
    ) -> Result<(String, String), String> {
        let index_name = self.search.analysis_index_name(envelope.timestamp_utc);
        let document = serde_json::json!({
            "timestampUtc": envelope.timestamp_utc,
            "eventName": envelope.event_name,
            "correlationId": envelope.correlation_id,
            "messageId": message_id,
            "analysis": {
                "sentiment_distribution": normalized.sentiment,
                "engagement_score": normalized.engagement_score,
                "topics": normalized.topics,
            },
            "flags": normalized.flags,
        });

        self.search.index_document(&index_name, message_id, &document).await.map_err(|e| e.to_string())?;
        self.search
            .ensure_alias(&index_name, self.search.analysis_alias())
            .await
            .map_err(|e| e.to_string())?;

        Ok((self.search.analysis_alias().to_string(), index_name))
    }
}
