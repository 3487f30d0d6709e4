// Central configuration, composed from small per-concern structs loaded from env.

pub mod helpers;
pub mod server;
pub mod testing;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

lazy_static! {
    pub static ref CONFIG: Config = Config::from_env();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: server::ServerConfig,
    pub database: server::DatabaseConfig,
    pub logging: server::LoggingConfig,
    pub outbox: server::OutboxConfig,
    pub broker: server::BrokerConfig,
    pub search: server::SearchConfig,
    pub testing: testing::TestingConfig,

    /// Maximum items accepted in one fast-path ingest batch.
    pub batch_ingest_limit: usize,
    /// Maximum messages accepted in one online analyze-feed request.
    pub analyze_feed_message_limit: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            server: server::ServerConfig::from_env(),
            database: server::DatabaseConfig::from_env(),
            logging: server::LoggingConfig::from_env(),
            outbox: server::OutboxConfig::from_env(),
            broker: server::BrokerConfig::from_env(),
            search: server::SearchConfig::from_env(),
            testing: testing::TestingConfig::from_env(),
            batch_ingest_limit: helpers::env_usize("FEEDPULSE_BATCH_INGEST_LIMIT", 1000),
            analyze_feed_message_limit: helpers::env_usize("FEEDPULSE_ANALYZE_FEED_MESSAGE_LIMIT", 5000),
        }
    }

    pub fn bind_address(&self) -> String {
        self.server.bind_address()
    }

    /// Validate config on startup; panics on startup are preferred here over
    /// surfacing a malformed pool at request time.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.outbox.batch_size <= 0 {
            anyhow::bail!("FEEDPULSE_OUTBOX_BATCH_SIZE must be positive");
        }
        if self.batch_ingest_limit == 0 {
            anyhow::bail!("FEEDPULSE_BATCH_INGEST_LIMIT must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
