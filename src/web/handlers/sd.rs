//! SD proxy endpoint: the bot's view of the open queue.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::web::request_id::RequestId;
use crate::web::WebState;

const DEFAULT_LIMIT: usize = 200;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct OpenQuery {
    pub limit: Option<usize>,
}

/// GET /sd/open: fetch the open queue through the proxy.
///
/// Always 200: failures are encoded in the body (`ok = false`) so the bot
/// client keeps one uniform result shape.
pub async fn get_open(
    State(state): State<Arc<WebState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Query(query): Query<OpenQuery>,
) -> Json<serde_json::Value> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match state.sd.fetch_open(limit).await {
        Ok(items) => Json(json!({
            "ok": true,
            "items": items,
            "count_returned": items.len(),
            "error": null,
            "request_id": request_id,
        })),
        Err(e) => {
            warn!(error = %e, request_id = %request_id, "SD open fetch failed");
            Json(json!({
                "ok": false,
                "items": [],
                "count_returned": 0,
                "error": e.to_string(),
                "request_id": request_id,
            }))
        }
    }
}
