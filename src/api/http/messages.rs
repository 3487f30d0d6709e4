// GET /messages?user_id&from_utc&to_utc&page&page_size — paginated retrieval
// of historical results with joined analysis and processing status.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    user_id: Option<String>,
    from_utc: Option<DateTime<Utc>>,
    to_utc: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_page_size")]
    page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    50
}

#[derive(Debug, Serialize)]
struct MessageView {
    #[serde(flatten)]
    message: crate::domain::Message,
    related: crate::domain::RelatedMessageData,
}

#[derive(Debug, Serialize)]
struct ListMessagesResponse {
    messages: Vec<MessageView>,
    total: i64,
    page: i64,
    page_size: i64,
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> impl IntoResponse {
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 200);

    let (messages, total) = match state
        .repo
        .list_messages(query.user_id.as_deref(), query.from_utc, query.to_utc, page, page_size)
        .await
    {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "failed to list messages");
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"})))
                .into_response();
        }
    };

    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let related = match state.repo.load_related(state.repo.pool(), &message.id).await {
            Ok(related) => related,
            Err(err) => {
                error!(error = %err, message_id = %message.id, "failed to load related data");
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({"error": "internal error"})))
                    .into_response();
            }
        };
        views.push(MessageView { message, related });
    }

    (StatusCode::OK, Json(ListMessagesResponse { messages: views, total, page, page_size })).into_response()
}
