//! Liveness and readiness.
//!
//! `/health` answers without touching any dependency; `/ready` verifies the
//! required environment and, under strict readiness, the database too.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

use crate::env::{missing_required_envs, strict_readiness};
use crate::web::WebState;

/// GET /health: process is up.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

/// GET /ready: configured and able to serve.
pub async fn get_ready(State(state): State<Arc<WebState>>) -> Response {
    let missing = missing_required_envs();
    let strict = strict_readiness();

    if !missing.is_empty() {
        if strict {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "not_ready", "missing": missing})),
            )
                .into_response();
        }
        warn!(missing = ?missing, "required env vars missing (non-strict readiness)");
    }

    if strict {
        if let Err(e) = sqlx::query("SELECT 1").execute(state.store.pool()).await {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "not_ready", "error": e.to_string()})),
            )
                .into_response();
        }
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "environment": state.environment.to_string(),
            "missing": missing,
        })),
    )
        .into_response()
}
