// POST /analyze-feed — the ingest HTTP surface's dual-mode entry point.
//
// Body `{messages[], time_window_minutes}` runs the analytic engine (C1)
// synchronously and persists through C2, returning 200 with the analysis.
// Body `{items[]}` routes through the bulk fast path (C3) and returns 202
// with a batch id; its items are pre-analyzed and considered already
// validated by the caller.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::engine;
use crate::metrics::{record_http_request, RequestTimer};
use crate::services::{ingest_fastpath, persistence};
use crate::state::AppState;

use super::error::ApiError;
use super::validation::{is_reserved_time_window, validate_message, RawFeedMessage};

#[derive(Debug, Deserialize)]
pub struct AnalyzeFeedRequest {
    #[serde(default)]
    messages: Option<Vec<RawFeedMessage>>,
    #[serde(default)]
    time_window_minutes: Option<i64>,
    #[serde(default)]
    items: Option<Vec<Value>>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    correlation_id: Option<String>,
}

pub async fn analyze_feed(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeFeedRequest>,
) -> impl IntoResponse {
    let correlation_id = request.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
    let _timer = RequestTimer::new("/analyze-feed");

    let response = if let Some(items) = request.items {
        handle_bulk(&state, items, &correlation_id).await.into_response()
    } else {
        handle_online(&state, request, &correlation_id).await.into_response()
    };

    record_http_request("/analyze-feed", response.status().as_u16());
    response
}

async fn handle_online(
    state: &Arc<AppState>,
    request: AnalyzeFeedRequest,
    correlation_id: &str,
) -> impl IntoResponse {
    let time_window_minutes = request.time_window_minutes.unwrap_or(30);
    if is_reserved_time_window(time_window_minutes) {
        return ApiError::unsupported_time_window(correlation_id).into_response();
    }
    if time_window_minutes <= 0 {
        return ApiError::validation("time_window_minutes must be a positive integer", correlation_id)
            .into_response();
    }

    let raw_messages = request.messages.unwrap_or_default();
    if raw_messages.is_empty() {
        return ApiError::validation("messages must contain at least one item", correlation_id).into_response();
    }
    if raw_messages.len() > crate::config::CONFIG.analyze_feed_message_limit {
        return ApiError::validation("messages exceeds the configured limit", correlation_id).into_response();
    }

    let mut validated = Vec::with_capacity(raw_messages.len());
    for raw in &raw_messages {
        match validate_message(raw) {
            Ok(message) => validated.push(message),
            Err(field) => {
                return ApiError::validation(format!("invalid field: {field}"), correlation_id).into_response();
            }
        }
    }

    let user_id = request
        .user_id
        .or_else(|| raw_messages.first().map(|m| m.user_id.clone()))
        .unwrap_or_else(|| "unknown".to_string());

    let analysis = engine::analyze(&validated, time_window_minutes);

    match persistence::persist_analysis(&state.repo, &user_id, Some(correlation_id), None, &analysis).await {
        Ok(persisted) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "analysis": analysis,
                "correlation_id": persisted.correlation_id,
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, correlation_id, "failed to persist analysis");
            ApiError::internal(correlation_id).into_response()
        }
    }
}

async fn handle_bulk(state: &Arc<AppState>, items: Vec<Value>, correlation_id: &str) -> impl IntoResponse {
    if items.len() > ingest_fastpath::MAX_BATCH_ITEMS {
        return ApiError::BatchTooLarge { correlation_id: correlation_id.to_string() }.into_response();
    }

    match ingest_fastpath::execute(&state.repo, items).await {
        Ok(result) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "batch_id": result.batch_id,
                "accepted": result.accepted,
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, correlation_id, "bulk ingest batch failed");
            ApiError::internal(correlation_id).into_response()
        }
    }
}
