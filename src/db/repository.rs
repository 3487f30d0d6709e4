//! Relational persistence for users, messages and their 1-to-1 children.
//!
//! Every mutating method takes a generic `sqlx::Executor` so callers can pass
//! either a bare pool (auto-commit) or a transaction handle — the repository
//! never opens or commits a transaction itself; that discipline belongs to
//! the caller (C3, C4, C5).

use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::domain::{
    AnomalyType, InfluenceRankingItem, Message, MessageAnomaly, MessageFlags, MessageProcessing,
    MessageSentiment, OutboxEvent, OutboxStatus, Patch, ProcessingStatus, RelatedMessageData, Topic,
    User,
};

use super::error::RepositoryError;

type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // ---- Lookups -----------------------------------------------------

    pub async fn get_message_by_correlation_id<'e, E>(
        &self,
        exec: E,
        correlation_id: &str,
    ) -> Result<Option<Message>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query(
            "SELECT id, user_id, correlation_id, created_at, request_raw, engagement_score, ranking, influence_ranking_score
             FROM messages WHERE correlation_id = ?1",
        )
        .bind(correlation_id)
        .fetch_optional(exec)
        .await?;
        Ok(row.map(|r| message_from_row(&r)))
    }

    pub async fn get_messages_by_correlation_ids<'e, E>(
        &self,
        exec: E,
        correlation_ids: &[String],
    ) -> Result<Vec<Message>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if correlation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = correlation_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, user_id, correlation_id, created_at, request_raw, engagement_score, ranking, influence_ranking_score
             FROM messages WHERE correlation_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for cid in correlation_ids {
            query = query.bind(cid);
        }
        let rows = query.fetch_all(exec).await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    pub async fn get_user_by_id<'e, E>(&self, exec: E, id: &str) -> Result<Option<User>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT id, external_key, created_at FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(exec)
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn get_user_by_external_key<'e, E>(
        &self,
        exec: E,
        external_key: &str,
    ) -> Result<Option<User>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let row = sqlx::query("SELECT id, external_key, created_at FROM users WHERE external_key = ?1")
            .bind(external_key)
            .fetch_optional(exec)
            .await?;
        Ok(row.map(|r| user_from_row(&r)))
    }

    pub async fn get_users_by_ids<'e, E>(&self, exec: E, ids: &[String]) -> Result<Vec<User>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("SELECT id, external_key, created_at FROM users WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(exec).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    pub async fn get_users_by_external_keys<'e, E>(
        &self,
        exec: E,
        keys: &[String],
    ) -> Result<Vec<User>>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = keys.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql =
            format!("SELECT id, external_key, created_at FROM users WHERE external_key IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for key in keys {
            query = query.bind(key);
        }
        let rows = query.fetch_all(exec).await?;
        Ok(rows.iter().map(user_from_row).collect())
    }

    /// Filters for `list_messages`; all optional.
    pub async fn list_messages(
        &self,
        user_id: Option<&str>,
        from_utc: Option<DateTime<Utc>>,
        to_utc: Option<DateTime<Utc>>,
        page: i64,
        page_size: i64,
    ) -> Result<(Vec<Message>, i64)> {
        let mut conditions = Vec::new();
        if user_id.is_some() {
            conditions.push("user_id = ?");
        }
        if from_utc.is_some() {
            conditions.push("created_at >= ?");
        }
        if to_utc.is_some() {
            conditions.push("created_at <= ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) as n FROM messages {where_clause}");
        let mut count_query = sqlx::query(&count_sql);
        if let Some(uid) = user_id {
            count_query = count_query.bind(uid);
        }
        if let Some(from) = from_utc {
            count_query = count_query.bind(from);
        }
        if let Some(to) = to_utc {
            count_query = count_query.bind(to);
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.try_get("n")?;

        let offset = (page.max(1) - 1) * page_size;
        let sql = format!(
            "SELECT id, user_id, correlation_id, created_at, request_raw, engagement_score, ranking, influence_ranking_score
             FROM messages {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut query = sqlx::query(&sql);
        if let Some(uid) = user_id {
            query = query.bind(uid);
        }
        if let Some(from) = from_utc {
            query = query.bind(from);
        }
        if let Some(to) = to_utc {
            query = query.bind(to);
        }
        query = query.bind(page_size).bind(offset);
        let rows = query.fetch_all(&self.pool).await?;
        Ok((rows.iter().map(message_from_row).collect(), total))
    }

    pub async fn load_related<'e, E>(&self, exec: E, message_id: &str) -> Result<RelatedMessageData>
    where
        E: sqlx::Executor<'e, Database = Sqlite> + Copy,
    {
        let sentiment = sqlx::query("SELECT positive, negative, neutral FROM message_sentiment WHERE message_id = ?1")
            .bind(message_id)
            .fetch_optional(exec)
            .await?
            .map(|r| MessageSentiment {
                positive: r.get("positive"),
                negative: r.get("negative"),
                neutral: r.get("neutral"),
            });

        let flags = sqlx::query(
            "SELECT mbras_employee, special_pattern, candidate_awareness FROM message_flags WHERE message_id = ?1",
        )
        .bind(message_id)
        .fetch_optional(exec)
        .await?
        .map(|r| MessageFlags {
            mbras_employee: r.get::<i64, _>("mbras_employee") != 0,
            special_pattern: r.get::<i64, _>("special_pattern") != 0,
            candidate_awareness: r.get::<i64, _>("candidate_awareness") != 0,
        });

        let anomaly = sqlx::query("SELECT anomaly_detected, anomaly_type FROM message_anomaly WHERE message_id = ?1")
            .bind(message_id)
            .fetch_optional(exec)
            .await?
            .map(|r| MessageAnomaly {
                anomaly_detected: r.get::<i64, _>("anomaly_detected") != 0,
                anomaly_type: r
                    .get::<Option<String>, _>("anomaly_type")
                    .and_then(|s| AnomalyType::parse(&s)),
            });

        let processing = sqlx::query(
            "SELECT message_id, queue_messaging, processing_success, processing_status,
                    failure_stage, failed_reason, elastic_name, elastic_index_name, updated_at
             FROM message_processing WHERE message_id = ?1",
        )
        .bind(message_id)
        .fetch_optional(exec)
        .await?
        .map(|r| processing_from_row(&r));

        let influence_items = sqlx::query(
            "SELECT id, message_id, external_user_key, followers, engagement_rate, influence_score
             FROM influence_ranking_items WHERE message_id = ?1",
        )
        .bind(message_id)
        .fetch_all(exec)
        .await?
        .iter()
        .map(influence_item_from_row)
        .collect();

        let topics = sqlx::query(
            "SELECT t.id as id, t.name as name FROM topics t
             INNER JOIN message_topics mt ON mt.topic_id = t.id
             WHERE mt.message_id = ?1",
        )
        .bind(message_id)
        .fetch_all(exec)
        .await?
        .iter()
        .map(|r| Topic { id: r.get("id"), name: r.get("name") })
        .collect();

        Ok(RelatedMessageData { sentiment, flags, anomaly, processing, influence_items, topics })
    }

    // ---- Inserts -------------------------------------------------------

    pub async fn create_message<'e, E>(&self, exec: E, message: &Message) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO messages (id, user_id, correlation_id, created_at, request_raw, engagement_score, ranking, influence_ranking_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&message.id)
        .bind(&message.user_id)
        .bind(&message.correlation_id)
        .bind(message.created_at)
        .bind(&message.request_raw)
        .bind(message.engagement_score)
        .bind(message.ranking)
        .bind(message.influence_ranking_score)
        .execute(exec)
        .await
        .map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    pub async fn create_sentiment<'e, E>(
        &self,
        exec: E,
        message_id: &str,
        sentiment: MessageSentiment,
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT INTO message_sentiment (message_id, positive, negative, neutral) VALUES (?1, ?2, ?3, ?4)")
            .bind(message_id)
            .bind(sentiment.positive)
            .bind(sentiment.negative)
            .bind(sentiment.neutral)
            .execute(exec)
            .await?;
        Ok(())
    }

    pub async fn create_flags<'e, E>(&self, exec: E, message_id: &str, flags: MessageFlags) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO message_flags (message_id, mbras_employee, special_pattern, candidate_awareness) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(message_id)
        .bind(flags.mbras_employee)
        .bind(flags.special_pattern)
        .bind(flags.candidate_awareness)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn create_anomaly<'e, E>(&self, exec: E, message_id: &str, anomaly: &MessageAnomaly) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT INTO message_anomaly (message_id, anomaly_detected, anomaly_type) VALUES (?1, ?2, ?3)")
            .bind(message_id)
            .bind(anomaly.anomaly_detected)
            .bind(anomaly.anomaly_type.map(|t| t.as_str()))
            .execute(exec)
            .await?;
        Ok(())
    }

    pub async fn create_processing<'e, E>(&self, exec: E, processing: &MessageProcessing) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO message_processing (message_id, queue_messaging, processing_success, processing_status, failure_stage, failed_reason, elastic_name, elastic_index_name, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&processing.message_id)
        .bind(&processing.queue_messaging)
        .bind(processing.processing_success)
        .bind(processing.processing_status.as_str())
        .bind(&processing.failure_stage)
        .bind(&processing.failed_reason)
        .bind(&processing.elastic_name)
        .bind(&processing.elastic_index_name)
        .bind(processing.updated_at)
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Conflict-tolerant: rows whose `id` already exists are skipped via
    /// `INSERT OR IGNORE`, satisfying the same "don't blow up on a concurrent
    /// insert" contract as a pre-filter-then-insert round trip, without the
    /// extra query. A single multi-row statement, so it works against any
    /// `Executor` used exactly once — pool or transaction alike.
    pub async fn bulk_insert_users<'e, E>(&self, exec: E, users: &[User]) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if users.is_empty() {
            return Ok(());
        }
        let values = users.iter().map(|_| "(?, ?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!("INSERT OR IGNORE INTO users (id, external_key, created_at) VALUES {values}");
        let mut query = sqlx::query(&sql);
        for user in users {
            query = query.bind(&user.id).bind(&user.external_key).bind(user.created_at);
        }
        query.execute(exec).await?;
        Ok(())
    }

    pub async fn bulk_insert_messages<'e, E>(&self, exec: E, messages: &[Message]) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if messages.is_empty() {
            return Ok(());
        }
        let values = messages.iter().map(|_| "(?, ?, ?, ?, ?, ?, ?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO messages (id, user_id, correlation_id, created_at, request_raw, engagement_score, ranking, influence_ranking_score)
             VALUES {values}"
        );
        let mut query = sqlx::query(&sql);
        for message in messages {
            query = query
                .bind(&message.id)
                .bind(&message.user_id)
                .bind(&message.correlation_id)
                .bind(message.created_at)
                .bind(&message.request_raw)
                .bind(message.engagement_score)
                .bind(message.ranking)
                .bind(message.influence_ranking_score);
        }
        query.execute(exec).await.map_err(RepositoryError::from_sqlx)?;
        Ok(())
    }

    pub async fn bulk_insert_message_processing<'e, E>(
        &self,
        exec: E,
        rows: &[MessageProcessing],
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if rows.is_empty() {
            return Ok(());
        }
        let values = rows.iter().map(|_| "(?, ?, ?, ?, ?, ?, ?, ?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO message_processing (message_id, queue_messaging, processing_success, processing_status, failure_stage, failed_reason, elastic_name, elastic_index_name, updated_at)
             VALUES {values}"
        );
        let mut query = sqlx::query(&sql);
        for row in rows {
            query = query
                .bind(&row.message_id)
                .bind(&row.queue_messaging)
                .bind(row.processing_success)
                .bind(row.processing_status.as_str())
                .bind(&row.failure_stage)
                .bind(&row.failed_reason)
                .bind(&row.elastic_name)
                .bind(&row.elastic_index_name)
                .bind(row.updated_at);
        }
        query.execute(exec).await?;
        Ok(())
    }

    pub async fn bulk_insert_outbox_events<'e, E>(&self, exec: E, events: &[OutboxEvent]) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        if events.is_empty() {
            return Ok(());
        }
        let values = events.iter().map(|_| "(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO outbox_events (id, message_id, correlation_id, event_type, payload, status, attempts, last_error, available_at, locked_at, locked_by, created_at, updated_at)
             VALUES {values}"
        );
        let mut query = sqlx::query(&sql);
        for event in events {
            query = query
                .bind(&event.id)
                .bind(&event.message_id)
                .bind(&event.correlation_id)
                .bind(&event.event_type)
                .bind(event.payload.to_string())
                .bind(event.status.as_str())
                .bind(event.attempts)
                .bind(&event.last_error)
                .bind(event.available_at)
                .bind(event.locked_at)
                .bind(&event.locked_by)
                .bind(event.created_at)
                .bind(event.updated_at);
        }
        query.execute(exec).await?;
        Ok(())
    }

    pub async fn add_influence_item<'e, E>(&self, exec: E, item: &InfluenceRankingItem) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO influence_ranking_items (id, message_id, external_user_key, followers, engagement_rate, influence_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&item.id)
        .bind(&item.message_id)
        .bind(&item.external_user_key)
        .bind(item.followers)
        .bind(item.engagement_rate)
        .bind(item.influence_score)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn add_message_topic<'e, E>(&self, exec: E, message_id: &str, topic_id: &str) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("INSERT OR IGNORE INTO message_topics (message_id, topic_id) VALUES (?1, ?2)")
            .bind(message_id)
            .bind(topic_id)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Needs a concrete transaction, not a generic `Executor`: it issues up
    /// to three sequential statements (read, insert, re-read) that must all
    /// observe each other, which only a single reused connection guarantees.
    pub async fn get_or_create_topic(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        name: &str,
    ) -> Result<Topic> {
        if let Some(row) = sqlx::query("SELECT id, name FROM topics WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut **tx)
            .await?
        {
            return Ok(Topic { id: row.get("id"), name: row.get("name") });
        }

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query("INSERT OR IGNORE INTO topics (id, name) VALUES (?1, ?2)")
            .bind(&id)
            .bind(name)
            .execute(&mut **tx)
            .await?;

        let row = sqlx::query("SELECT id, name FROM topics WHERE name = ?1")
            .bind(name)
            .fetch_one(&mut **tx)
            .await?;
        Ok(Topic { id: row.get("id"), name: row.get("name") })
    }

    // ---- Upserts ---------------------------------------------------------

    pub async fn upsert_sentiment<'e, E>(&self, exec: E, message_id: &str, sentiment: MessageSentiment) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO message_sentiment (message_id, positive, negative, neutral) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id) DO UPDATE SET positive = excluded.positive, negative = excluded.negative, neutral = excluded.neutral",
        )
        .bind(message_id)
        .bind(sentiment.positive)
        .bind(sentiment.negative)
        .bind(sentiment.neutral)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn upsert_flags<'e, E>(&self, exec: E, message_id: &str, flags: MessageFlags) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO message_flags (message_id, mbras_employee, special_pattern, candidate_awareness) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id) DO UPDATE SET mbras_employee = excluded.mbras_employee, special_pattern = excluded.special_pattern, candidate_awareness = excluded.candidate_awareness",
        )
        .bind(message_id)
        .bind(flags.mbras_employee)
        .bind(flags.special_pattern)
        .bind(flags.candidate_awareness)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn upsert_anomaly<'e, E>(&self, exec: E, message_id: &str, anomaly: &MessageAnomaly) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "INSERT INTO message_anomaly (message_id, anomaly_detected, anomaly_type) VALUES (?1, ?2, ?3)
             ON CONFLICT(message_id) DO UPDATE SET anomaly_detected = excluded.anomaly_detected, anomaly_type = excluded.anomaly_type",
        )
        .bind(message_id)
        .bind(anomaly.anomaly_detected)
        .bind(anomaly.anomaly_type.map(|t| t.as_str()))
        .execute(exec)
        .await?;
        Ok(())
    }

    /// Same reasoning as [`Self::get_or_create_topic`]: looks up-or-creates
    /// a topic per name, so it needs a concrete, reusable transaction handle.
    pub async fn replace_topics(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        message_id: &str,
        names: &[String],
    ) -> Result<()> {
        sqlx::query("DELETE FROM message_topics WHERE message_id = ?1")
            .bind(message_id)
            .execute(&mut **tx)
            .await?;
        for name in names {
            let topic = self.get_or_create_topic(tx, name).await?;
            self.add_message_topic(&mut **tx, message_id, &topic.id).await?;
        }
        Ok(())
    }

    pub async fn replace_influence_items(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        message_id: &str,
        items: &[InfluenceRankingItem],
    ) -> Result<()> {
        sqlx::query("DELETE FROM influence_ranking_items WHERE message_id = ?1")
            .bind(message_id)
            .execute(&mut **tx)
            .await?;
        for item in items {
            self.add_influence_item(&mut **tx, item).await?;
        }
        Ok(())
    }

    pub async fn update_message_engagement<'e, E>(
        &self,
        exec: E,
        message_id: &str,
        engagement_score: f64,
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE messages SET engagement_score = ?1 WHERE id = ?2")
            .bind(engagement_score)
            .bind(message_id)
            .execute(exec)
            .await?;
        Ok(())
    }

    /// Each field is a [`Patch`] so the caller can distinguish "leave
    /// alone" from "clear it".
    pub async fn update_processing<'e, E>(
        &self,
        exec: E,
        message_id: &str,
        processing_status: Option<ProcessingStatus>,
        queue_messaging: Patch<String>,
        processing_success: Patch<bool>,
        failure_stage: Patch<String>,
        failed_reason: Patch<String>,
        elastic_name: Patch<String>,
        elastic_index_name: Patch<String>,
        updated_at: DateTime<Utc>,
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut binds_status: Option<&str> = None;
        if let Some(status) = processing_status {
            sets.push("processing_status = ?".to_string());
            binds_status = Some(status.as_str());
        }

        let queue_messaging = queue_messaging.into_option();
        if queue_messaging.is_some() {
            sets.push("queue_messaging = ?".to_string());
        }
        let processing_success = processing_success.into_option();
        if processing_success.is_some() {
            sets.push("processing_success = ?".to_string());
        }
        let failure_stage = failure_stage.into_option();
        if failure_stage.is_some() {
            sets.push("failure_stage = ?".to_string());
        }
        let failed_reason = failed_reason.into_option();
        if failed_reason.is_some() {
            sets.push("failed_reason = ?".to_string());
        }
        let elastic_name = elastic_name.into_option();
        if elastic_name.is_some() {
            sets.push("elastic_name = ?".to_string());
        }
        let elastic_index_name = elastic_index_name.into_option();
        if elastic_index_name.is_some() {
            sets.push("elastic_index_name = ?".to_string());
        }

        let sql = format!(
            "UPDATE message_processing SET {} WHERE message_id = ?",
            sets.join(", ")
        );
        let mut query = sqlx::query(&sql).bind(updated_at);
        if let Some(status) = binds_status {
            query = query.bind(status);
        }
        if let Some(v) = queue_messaging {
            query = query.bind(v);
        }
        if let Some(v) = processing_success {
            query = query.bind(v);
        }
        if let Some(v) = failure_stage {
            query = query.bind(v);
        }
        if let Some(v) = failed_reason {
            query = query.bind(v);
        }
        if let Some(v) = elastic_name {
            query = query.bind(v);
        }
        if let Some(v) = elastic_index_name {
            query = query.bind(v);
        }
        query = query.bind(message_id);
        query.execute(exec).await?;
        Ok(())
    }

    // ---- Outbox operations -------------------------------------------

    /// Claims up to `limit` due events for `worker_id`, bumping `attempts`
    /// and setting the lock, all inside the caller's transaction.
    pub async fn claim_outbox_events(
        &self,
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        now: DateTime<Utc>,
        lock_cutoff: DateTime<Utc>,
        worker_id: &str,
        limit: i64,
        event_types: Option<&[String]>,
    ) -> Result<Vec<OutboxEvent>> {
        let type_filter = event_types
            .filter(|types| !types.is_empty())
            .map(|types| format!(" AND event_type IN ({})", types.iter().map(|_| "?").collect::<Vec<_>>().join(",")));

        let select_sql = format!(
            "SELECT id FROM outbox_events
             WHERE status IN ('pending', 'failed') AND available_at <= ?1
               AND (locked_at IS NULL OR locked_at < ?2){}
             ORDER BY created_at ASC LIMIT ?3",
            type_filter.as_deref().unwrap_or("")
        );
        let mut select_query = sqlx::query(&select_sql).bind(now).bind(lock_cutoff);
        if let Some(types) = event_types.filter(|t| !t.is_empty()) {
            for t in types {
                select_query = select_query.bind(t);
            }
        }
        select_query = select_query.bind(limit);
        let ids: Vec<String> = select_query
            .fetch_all(&mut **tx)
            .await?
            .iter()
            .map(|r| r.get::<String, _>("id"))
            .collect();

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        for id in &ids {
            sqlx::query(
                "UPDATE outbox_events SET locked_at = ?1, locked_by = ?2, attempts = attempts + 1, updated_at = ?1 WHERE id = ?3",
            )
            .bind(now)
            .bind(worker_id)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        }

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT id, message_id, correlation_id, event_type, payload, status, attempts, last_error, available_at, locked_at, locked_by, created_at, updated_at
             FROM outbox_events WHERE id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql);
        for id in &ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&mut **tx).await?;
        Ok(rows.iter().map(outbox_from_row).collect())
    }

    pub async fn mark_outbox_published<'e, E>(&self, exec: E, id: &str, now: DateTime<Utc>) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            "UPDATE outbox_events SET status = 'published', last_error = NULL, locked_at = NULL, locked_by = NULL, updated_at = ?1 WHERE id = ?2",
        )
        .bind(now)
        .bind(id)
        .execute(exec)
        .await?;
        Ok(())
    }

    pub async fn mark_outbox_failed<'e, E>(
        &self,
        exec: E,
        id: &str,
        now: DateTime<Utc>,
        next_available_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let truncated: String = last_error.chars().take(2000).collect();
        sqlx::query(
            "UPDATE outbox_events SET status = 'failed', last_error = ?1, available_at = ?2, locked_at = NULL, locked_by = NULL, updated_at = ?3 WHERE id = ?4",
        )
        .bind(truncated)
        .bind(next_available_at)
        .bind(now)
        .bind(id)
        .execute(exec)
        .await?;
        Ok(())
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        external_key: row.get("external_key"),
        created_at: row.get("created_at"),
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: row.get("id"),
        user_id: row.get("user_id"),
        correlation_id: row.get("correlation_id"),
        created_at: row.get("created_at"),
        request_raw: row.get("request_raw"),
        engagement_score: row.get("engagement_score"),
        ranking: row.get("ranking"),
        influence_ranking_score: row.get("influence_ranking_score"),
    }
}

fn processing_from_row(row: &sqlx::sqlite::SqliteRow) -> MessageProcessing {
    MessageProcessing {
        message_id: row.get("message_id"),
        queue_messaging: row.get("queue_messaging"),
        processing_success: row.get::<Option<i64>, _>("processing_success").map(|v| v != 0),
        processing_status: ProcessingStatus::parse(&row.get::<String, _>("processing_status"))
            .unwrap_or(ProcessingStatus::Received),
        failure_stage: row.get("failure_stage"),
        failed_reason: row.get("failed_reason"),
        elastic_name: row.get("elastic_name"),
        elastic_index_name: row.get("elastic_index_name"),
        updated_at: row.get("updated_at"),
    }
}

fn influence_item_from_row(row: &sqlx::sqlite::SqliteRow) -> InfluenceRankingItem {
    InfluenceRankingItem {
        id: row.get("id"),
        message_id: row.get("message_id"),
        external_user_key: row.get("external_user_key"),
        followers: row.get("followers"),
        engagement_rate: row.get("engagement_rate"),
        influence_score: row.get("influence_score"),
    }
}

fn outbox_from_row(row: &sqlx::sqlite::SqliteRow) -> OutboxEvent {
    OutboxEvent {
        id: row.get("id"),
        message_id: row.get("message_id"),
        correlation_id: row.get("correlation_id"),
        event_type: row.get("event_type"),
        payload: serde_json::from_str(&row.get::<String, _>("payload")).unwrap_or(serde_json::Value::Null),
        status: OutboxStatus::parse(&row.get::<String, _>("status")).unwrap_or(OutboxStatus::Pending),
        attempts: row.get("attempts"),
        last_error: row.get("last_error"),
        available_at: row.get("available_at"),
        locked_at: row.get("locked_at"),
        locked_by: row.get("locked_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_repo() -> Repository {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.unwrap();
        schema::apply(&pool).await.unwrap();
        Repository::new(pool)
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-20T10:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn create_message_round_trips_by_correlation_id() {
        let repo = test_repo().await;
        let user = User { id: "u1".into(), external_key: None, created_at: now() };
        repo.bulk_insert_users(repo.pool(), &[user.clone()]).await.unwrap();

        let message = Message {
            id: "m1".into(),
            user_id: user.id.clone(),
            correlation_id: "corr-1".into(),
            created_at: now(),
            request_raw: None,
            engagement_score: Some(42.0),
            ranking: None,
            influence_ranking_score: None,
        };
        repo.create_message(repo.pool(), &message).await.unwrap();

        let fetched = repo.get_message_by_correlation_id(repo.pool(), "corr-1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "m1");
        assert_eq!(fetched.engagement_score, Some(42.0));
    }

    #[tokio::test]
    async fn duplicate_correlation_id_is_reported_as_unique_violation() {
        let repo = test_repo().await;
        let user = User { id: "u1".into(), external_key: None, created_at: now() };
        repo.bulk_insert_users(repo.pool(), &[user.clone()]).await.unwrap();

        let message = Message {
            id: "m1".into(),
            user_id: user.id.clone(),
            correlation_id: "corr-dup".into(),
            created_at: now(),
            request_raw: None,
            engagement_score: None,
            ranking: None,
            influence_ranking_score: None,
        };
        repo.create_message(repo.pool(), &message).await.unwrap();

        let mut duplicate = message.clone();
        duplicate.id = "m2".into();
        let err = repo.create_message(repo.pool(), &duplicate).await.unwrap_err();
        assert!(err.is_duplicate_correlation_id());
    }

    #[tokio::test]
    async fn claim_outbox_events_locks_and_increments_attempts() {
        let repo = test_repo().await;
        let user = User { id: "u1".into(), external_key: None, created_at: now() };
        repo.bulk_insert_users(repo.pool(), &[user.clone()]).await.unwrap();
        let message = Message {
            id: "m1".into(),
            user_id: user.id,
            correlation_id: "corr-1".into(),
            created_at: now(),
            request_raw: None,
            engagement_score: None,
            ranking: None,
            influence_ranking_score: None,
        };
        repo.create_message(repo.pool(), &message).await.unwrap();

        let event = OutboxEvent {
            id: "e1".into(),
            message_id: message.id.clone(),
            correlation_id: message.correlation_id.clone(),
            event_type: "message_received".into(),
            payload: serde_json::json!({}),
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            available_at: now(),
            locked_at: None,
            locked_by: None,
            created_at: now(),
            updated_at: now(),
        };
        repo.bulk_insert_outbox_events(repo.pool(), &[event]).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        let claimed = repo
            .claim_outbox_events(&mut tx, now(), now() - chrono::Duration::seconds(30), "worker-1", 10, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].attempts, 1);
        assert_eq!(claimed[0].locked_by.as_deref(), Some("worker-1"));
    }
}
