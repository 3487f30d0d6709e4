// Health check, readiness and liveness endpoints for load balancers and
// container orchestrators.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    db: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    migrations: &'static str,
}

/// GET /health — 200 if the database is reachable, 503 otherwise.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = sqlx::query("SELECT 1").fetch_one(state.repo.pool()).await.is_ok();

    let response = HealthResponse { status: if db_ok { "healthy" } else { "unhealthy" }, db: if db_ok { "ok" } else { "error" } };

    if db_ok {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// GET /ready — 200 once the schema has been applied and is queryable.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let migrations_ok = sqlx::query("SELECT 1 FROM users LIMIT 1").fetch_optional(state.repo.pool()).await.is_ok();

    let response = ReadyResponse {
        status: if migrations_ok { "ready" } else { "not_ready" },
        migrations: if migrations_ok { "applied" } else { "pending" },
    };

    if migrations_ok {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// GET /live — simple ping to verify the process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"status": "alive"})))
}
