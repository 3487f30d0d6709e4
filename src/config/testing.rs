// Bypass flags for exercising the HTTP edge without live infrastructure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestingConfig {
    /// Skip persistence for the online analyze-feed path (FEEDPULSE_BYPASS_PERSISTENCE).
    pub bypass_persistence: bool,
    /// Skip publishing to the broker (FEEDPULSE_BYPASS_RABBIT).
    pub bypass_rabbit: bool,
    /// Skip writing to the search index (FEEDPULSE_BYPASS_ELASTIC).
    pub bypass_elastic: bool,
}

impl TestingConfig {
    pub fn from_env() -> Self {
        Self {
            bypass_persistence: bool_env("FEEDPULSE_BYPASS_PERSISTENCE"),
            bypass_rabbit: bool_env("FEEDPULSE_BYPASS_RABBIT"),
            bypass_elastic: bool_env("FEEDPULSE_BYPASS_ELASTIC"),
        }
    }
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            bypass_persistence: false,
            bypass_rabbit: false,
            bypass_elastic: false,
        }
    }
}

fn bool_env(key: &str) -> bool {
    std::env::var(key).map(|v| v == "true" || v == "1").unwrap_or(false)
}
