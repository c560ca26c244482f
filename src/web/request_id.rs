//! Request correlation middleware.
//!
//! Every inbound request gets an `X-Request-ID`: the caller's, when present,
//! otherwise a fresh UUID v4. The id is stored as an axum [`Extension`] for
//! handlers, echoed back in the response header, and wrapped in a tracing
//! span so every log line of the request carries it.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

/// Newtype carrying the assigned request id.
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Axum middleware assigning a [`RequestId`] to every request.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::debug_span!("request", request_id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}
