// src/state.rs
// Application state shared across HTTP handlers and background workers.

use std::sync::Arc;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;

use crate::config::CONFIG;
use crate::db::Repository;
use crate::messaging::{LapinPublisher, NullPublisher, Publisher};
use crate::search::SearchIndexWriter;
use crate::workers::WorkerMetrics;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub publisher: Arc<dyn Publisher>,
    pub search: Arc<SearchIndexWriter>,
    pub metrics: Arc<WorkerMetrics>,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        CONFIG.validate()?;

        info!(url = %CONFIG.database.url, "connecting to database");
        let pool = SqlitePoolOptions::new()
            .max_connections(CONFIG.database.max_connections)
            .connect(&CONFIG.database.url)
            .await?;
        crate::db::schema::apply(&pool).await?;
        let repo = Repository::new(pool);

        info!("initializing search index writer");
        let search = Arc::new(SearchIndexWriter::new(&CONFIG.search));

        let publisher: Arc<dyn Publisher> = if CONFIG.testing.bypass_rabbit {
            info!("broker publishing bypassed by test configuration, using null publisher");
            Arc::new(NullPublisher)
        } else {
            info!(exchange = %CONFIG.broker.exchange, "initializing broker publisher");
            Arc::new(LapinPublisher::new(CONFIG.broker.clone()))
        };

        let metrics = Arc::new(WorkerMetrics::new());

        info!("application state initialized");

        Ok(Self { repo, publisher, search, metrics })
    }
}
