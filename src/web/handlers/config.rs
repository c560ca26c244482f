//! Config endpoints: read, replace, history, rollback, rollback stats.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::web::auth::AdminAuth;
use crate::web::store::StoreError;
use crate::web::WebState;

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const DEFAULT_ROLLBACK_WINDOW_S: i64 = 3600;

fn actor_from(headers: &HeaderMap) -> &str {
    headers
        .get("x-actor")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .unwrap_or("admin-api")
}

fn internal_error(e: &StoreError) -> Response {
    error!(error = %e, "config store error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "store_error", "message": e.to_string()})),
    )
        .into_response()
}

/// GET /config: current config body with `version` injected.
pub async fn get_config(State(state): State<Arc<WebState>>) -> Response {
    match state.store.read().await {
        Ok((body, _version)) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            error!(error = %e, "config read failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "config_unavailable", "message": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// PUT /config: validate and apply a replacement config.
pub async fn put_config(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    match state.store.write(&body, actor_from(&headers), None).await {
        Ok(version) => (StatusCode::OK, Json(json!({"version": version}))).into_response(),
        Err(StoreError::Validation(e)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.kind, "path": e.path, "message": e.message})),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /config/history: most recent history rows.
pub async fn get_history(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    match state.store.history(limit).await {
        Ok(rows) => (StatusCode::OK, Json(json!({"items": rows}))).into_response(),
        Err(e) => internal_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RollbackBody {
    pub to_version: i64,
}

/// POST /config/rollback: re-apply an earlier version's body.
pub async fn post_rollback(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
    headers: HeaderMap,
    Json(body): Json<RollbackBody>,
) -> Response {
    match state
        .store
        .rollback(body.to_version, actor_from(&headers))
        .await
    {
        Ok(version) => (StatusCode::OK, Json(json!({"version": version}))).into_response(),
        Err(StoreError::UnknownVersion(v)) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown_version", "message": format!("version {v} not found")})),
        )
            .into_response(),
        Err(StoreError::Validation(e)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": e.kind, "path": e.path, "message": e.message})),
        )
            .into_response(),
        Err(e) => internal_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RollbacksQuery {
    pub window_s: Option<i64>,
}

/// GET /config/rollbacks: rollback frequency within a window.
pub async fn get_rollbacks(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
    Query(query): Query<RollbacksQuery>,
) -> Response {
    let window_s = query.window_s.unwrap_or(DEFAULT_ROLLBACK_WINDOW_S).max(1);
    match state.store.rollback_stats(window_s).await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => internal_error(&e),
    }
}
