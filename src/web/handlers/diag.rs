//! Diagnostics: routing explainers and eventlog filter listing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::routing::explain_matches;
use crate::runtime::{ConfigSource, RuntimeConfig};
use crate::sd::Ticket;
use crate::web::auth::AdminAuth;
use crate::web::WebState;

#[derive(Debug, Deserialize)]
pub struct ExplainBody {
    pub items: Vec<Ticket>,
}

/// POST /routing/explain: run sample tickets through the live routing
/// config and report, per item, the first matching criterion.
pub async fn post_explain(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
    Json(body): Json<ExplainBody>,
) -> Response {
    let (config_json, version) = match state.store.read().await {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "config read failed for explain");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "config_unavailable", "message": e.to_string()})),
            )
                .into_response();
        }
    };

    let cfg = RuntimeConfig::from_json(&config_json, ConfigSource::Web);
    let explained = explain_matches(&body.items, &cfg.routing.rules, &cfg.routing.bindings);

    (
        StatusCode::OK,
        Json(json!({"version": version, "items": explained})),
    )
        .into_response()
}

/// GET /eventlog/filters: enabled eventlog filters, id order.
pub async fn get_eventlog_filters(
    State(state): State<Arc<WebState>>,
    _auth: AdminAuth,
) -> Response {
    match state.eventlog_filters.list_enabled().await {
        Ok(filters) => (StatusCode::OK, Json(json!({"items": filters}))).into_response(),
        Err(e) => {
            error!(error = %e, "eventlog filter listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "store_error", "message": e.to_string()})),
            )
                .into_response()
        }
    }
}
