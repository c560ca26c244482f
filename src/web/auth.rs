//! Admin bearer-token authentication for the config surface.
//!
//! One shared token (`CONFIG_ADMIN_TOKEN`) guards every mutating or
//! history-revealing endpoint. The comparison is constant-time so the token
//! cannot be probed byte by byte through response timing.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use super::WebState;

/// Error response body for auth failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Extractor proving the request carried the admin token.
pub struct AdminAuth;

/// Byte-wise constant-time equality. Length mismatch returns early; the
/// token length is not a secret.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[async_trait]
impl FromRequestParts<Arc<WebState>> for AdminAuth {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<WebState>,
    ) -> Result<Self, Self::Rejection> {
        if state.admin_token.is_empty() {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Admin API disabled: CONFIG_ADMIN_TOKEN is not set".to_string(),
                }),
            ));
        }

        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Missing Bearer token".to_string(),
                }),
            ))?;

        if constant_time_eq(token.as_bytes(), state.admin_token.as_bytes()) {
            Ok(AdminAuth)
        } else {
            Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid admin token".to_string(),
                }),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_basics() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }
}
