//! Message persistence for the online `/analyze-feed` path: one computed
//! [`crate::engine::Analysis`] becomes a `Message` plus its six child rows,
//! written in a single transaction. A `DuplicateCorrelationId` from C2 is
//! translated into an idempotent lookup of the existing message rather than
//! surfaced to the caller (invariant 1).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{Repository, RepositoryError};
use crate::domain::{
    InfluenceRankingItem, Message, MessageAnomaly, MessageProcessing, ProcessingStatus,
};
use crate::engine::Analysis;

#[derive(Debug, Clone)]
pub struct PersistedMessage {
    pub message_id: String,
    pub correlation_id: String,
}

/// Persists one analyzed message and its children, resolving `user_id`
/// against an existing user row or creating one on first reference.
pub async fn persist_analysis(
    repo: &Repository,
    user_id: &str,
    correlation_id: Option<&str>,
    request_raw: Option<&str>,
    analysis: &Analysis,
) -> Result<PersistedMessage, RepositoryError> {
    let now = Utc::now();
    let correlation_id = correlation_id
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Some(existing) = repo.get_message_by_correlation_id(repo.pool(), &correlation_id).await? {
        return Ok(PersistedMessage { message_id: existing.id, correlation_id: existing.correlation_id });
    }

    let resolved_user_id = resolve_user(repo, user_id, now).await?;

    let mut tx = repo.begin().await?;

    let message = Message {
        id: Uuid::new_v4().to_string(),
        user_id: resolved_user_id,
        correlation_id: correlation_id.clone(),
        created_at: now,
        request_raw: request_raw.map(str::to_string),
        engagement_score: Some(analysis.engagement_score),
        ranking: None,
        influence_ranking_score: None,
    };

    match repo.create_message(&mut *tx, &message).await {
        Ok(()) => {}
        Err(err) if err.is_duplicate_correlation_id() => {
            tx.rollback().await?;
            let existing = repo
                .get_message_by_correlation_id(repo.pool(), &correlation_id)
                .await?
                .ok_or(RepositoryError::NotFound)?;
            return Ok(PersistedMessage { message_id: existing.id, correlation_id: existing.correlation_id });
        }
        Err(err) => return Err(err),
    }

    repo.create_sentiment(&mut *tx, &message.id, analysis.sentiment_distribution).await?;
    repo.create_flags(&mut *tx, &message.id, analysis.flags).await?;
    repo.create_anomaly(
        &mut *tx,
        &message.id,
        &MessageAnomaly {
            anomaly_detected: analysis.anomaly.anomaly_detected,
            anomaly_type: analysis.anomaly.anomaly_type,
        },
    )
    .await?;
    repo.create_processing(
        &mut *tx,
        &MessageProcessing {
            message_id: message.id.clone(),
            queue_messaging: None,
            processing_success: None,
            processing_status: ProcessingStatus::Received,
            failure_stage: None,
            failed_reason: None,
            elastic_name: None,
            elastic_index_name: None,
            updated_at: now,
        },
    )
    .await?;

    let topic_names: Vec<String> = analysis.trending_topics.iter().map(|t| t.tag.clone()).collect();
    repo.replace_topics(&mut tx, &message.id, &topic_names).await?;

    let influence_items: Vec<InfluenceRankingItem> = analysis
        .influence_ranking
        .iter()
        .map(|entry| InfluenceRankingItem {
            id: Uuid::new_v4().to_string(),
            message_id: message.id.clone(),
            external_user_key: entry.user_id.clone(),
            followers: entry.followers as i64,
            engagement_rate: entry.engagement_rate,
            influence_score: entry.influence_score,
        })
        .collect();
    repo.replace_influence_items(&mut tx, &message.id, &influence_items).await?;

    let outbox_payload = serde_json::json!({
        "user_id": user_id,
        "sentiment_distribution": analysis.sentiment_distribution,
        "engagement_score": analysis.engagement_score,
        "trending_topics": analysis.trending_topics,
        "influence_ranking": analysis.influence_ranking,
        "anomaly_detected": analysis.anomaly.anomaly_detected,
        "anomaly_type": analysis.anomaly.anomaly_type,
        "flags": analysis.flags,
    });
    repo.bulk_insert_outbox_events(
        &mut *tx,
        &[crate::domain::OutboxEvent {
            id: Uuid::new_v4().to_string(),
            message_id: message.id.clone(),
            correlation_id: message.correlation_id.clone(),
            event_type: crate::messaging::EVENT_MESSAGE_RECEIVED.to_string(),
            payload: outbox_payload,
            status: crate::domain::OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now,
            locked_at: None,
            locked_by: None,
            created_at: now,
            updated_at: now,
        }],
    )
    .await?;

    tx.commit().await?;

    Ok(PersistedMessage { message_id: message.id, correlation_id: message.correlation_id })
}

async fn resolve_user(repo: &Repository, raw_user_id: &str, now: DateTime<Utc>) -> Result<String, RepositoryError> {
    if let Ok(uuid) = Uuid::parse_str(raw_user_id) {
        let id = uuid.to_string();
        if repo.get_user_by_id(repo.pool(), &id).await?.is_none() {
            repo.bulk_insert_users(
                repo.pool(),
                &[crate::domain::User { id: id.clone(), external_key: Some(id.clone()), created_at: now }],
            )
            .await?;
        }
        return Ok(id);
    }

    if let Some(user) = repo.get_user_by_external_key(repo.pool(), raw_user_id).await? {
        return Ok(user.id);
    }

    let id = Uuid::new_v4().to_string();
    repo.bulk_insert_users(
        repo.pool(),
        &[crate::domain::User { id: id.clone(), external_key: Some(raw_user_id.to_string()), created_at: now }],
    )
    .await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::domain::{MessageFlags, MessageSentiment};
    use crate::engine::AnomalyResult;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> Repository {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.unwrap();
        schema::apply(&pool).await.unwrap();
        Repository::new(pool)
    }

    fn sample_analysis() -> Analysis {
        Analysis {
            sentiment_distribution: MessageSentiment { positive: 100.0, negative: 0.0, neutral: 0.0 },
            engagement_score: 42.0,
            trending_topics: Vec::new(),
            influence_ranking: Vec::new(),
            anomaly: AnomalyResult { anomaly_detected: false, anomaly_type: None },
            flags: MessageFlags::default(),
        }
    }

    #[tokio::test]
    async fn persists_message_and_children_for_new_external_user() {
        let repo = test_repo().await;
        let analysis = sample_analysis();
        let persisted = persist_analysis(&repo, "user_abc123", None, None, &analysis).await.unwrap();

        let related = repo.load_related(repo.pool(), &persisted.message_id).await.unwrap();
        assert_eq!(related.sentiment.unwrap().positive, 100.0);
        assert!(related.processing.is_some());
        assert_eq!(related.processing.unwrap().processing_status, ProcessingStatus::Received);
    }

    #[tokio::test]
    async fn repeated_correlation_id_returns_the_same_message() {
        let repo = test_repo().await;
        let analysis = sample_analysis();
        let first = persist_analysis(&repo, "user_abc123", Some("fixed-cid-1"), None, &analysis).await.unwrap();
        let second = persist_analysis(&repo, "user_abc123", Some("fixed-cid-1"), None, &analysis).await.unwrap();
        assert_eq!(first.message_id, second.message_id);

        let (messages, total) = repo.list_messages(None, None, None, 1, 50).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(messages.len(), 1);
    }
}
