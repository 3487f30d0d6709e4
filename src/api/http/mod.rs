// src/api/http/mod.rs

pub mod analyze_feed;
pub mod error;
pub mod health;
pub mod messages;
pub mod validation;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;

pub use analyze_feed::analyze_feed;
pub use health::{health_check, liveness_check, readiness_check};
pub use messages::list_messages;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/analyze-feed", post(analyze_feed))
        .route("/messages", get(list_messages))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/metrics", get(metrics_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
