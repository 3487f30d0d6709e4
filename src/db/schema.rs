//! Embedded schema, applied once at process startup. No migration framework:
//! every statement is `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`,
//! so repeated application is harmless.

use sqlx::SqlitePool;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    external_key TEXT UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id),
    correlation_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    request_raw TEXT,
    engagement_score REAL,
    ranking REAL,
    influence_ranking_score REAL
);
CREATE INDEX IF NOT EXISTS idx_messages_user ON messages(user_id);
CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);

CREATE TABLE IF NOT EXISTS message_sentiment (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    positive REAL NOT NULL,
    negative REAL NOT NULL,
    neutral REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS message_flags (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    mbras_employee INTEGER NOT NULL,
    special_pattern INTEGER NOT NULL,
    candidate_awareness INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS message_anomaly (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    anomaly_detected INTEGER NOT NULL,
    anomaly_type TEXT
);

CREATE TABLE IF NOT EXISTS message_processing (
    message_id TEXT PRIMARY KEY REFERENCES messages(id),
    queue_messaging TEXT,
    processing_success INTEGER,
    processing_status TEXT NOT NULL,
    failure_stage TEXT,
    failed_reason TEXT,
    elastic_name TEXT,
    elastic_index_name TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS message_topics (
    message_id TEXT NOT NULL REFERENCES messages(id),
    topic_id TEXT NOT NULL REFERENCES topics(id),
    PRIMARY KEY (message_id, topic_id)
);

CREATE TABLE IF NOT EXISTS influence_ranking_items (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(id),
    external_user_key TEXT NOT NULL,
    followers INTEGER NOT NULL,
    engagement_rate REAL NOT NULL,
    influence_score REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_influence_message ON influence_ranking_items(message_id);

CREATE TABLE IF NOT EXISTS outbox_events (
    id TEXT PRIMARY KEY,
    message_id TEXT NOT NULL REFERENCES messages(id),
    correlation_id TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    available_at TEXT NOT NULL,
    locked_at TEXT,
    locked_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_outbox_status_available ON outbox_events(status, available_at);
CREATE INDEX IF NOT EXISTS idx_outbox_locked_at ON outbox_events(locked_at);
"#;

pub async fn apply(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn schema_applies_cleanly_and_is_idempotent() {
        let pool = SqlitePoolOptions::new().connect(":memory:").await.unwrap();
        apply(&pool).await.unwrap();
        apply(&pool).await.unwrap();
    }
}
