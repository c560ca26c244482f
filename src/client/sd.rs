//! Open-queue fetch: bot → web `/sd/open`.
//!
//! The call never returns `Err`; every failure mode (transport, status,
//! payload) is encoded in [`SdOpenResult`] so the poller's state machine
//! sees one uniform shape.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::sd::Ticket;

/// Default total timeout for an open-queue fetch.
pub const DEFAULT_TIMEOUT_S: f64 = 3.0;

/// Result of one open-queue fetch.
#[derive(Debug, Clone)]
pub struct SdOpenResult {
    pub ok: bool,
    pub items: Vec<Ticket>,
    pub count_returned: usize,
    pub error: Option<String>,
    pub request_id: String,
}

impl SdOpenResult {
    /// Failure with the given error string, preserving the request id.
    pub fn failed(error: impl Into<String>, request_id: String) -> Self {
        Self {
            ok: false,
            items: Vec::new(),
            count_returned: 0,
            error: Some(error.into()),
            request_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SdOpenPayload {
    ok: bool,
    #[serde(default)]
    items: Vec<Ticket>,
    #[serde(default)]
    count_returned: usize,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Client for the web service's SD proxy endpoint.
#[derive(Clone)]
pub struct SdWebClient {
    http: reqwest::Client,
    base_url: String,
}

impl SdWebClient {
    pub fn new(base_url: &str, timeout_s: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the open queue. All failures come back as `ok = false`.
    pub async fn get_open(&self, limit: usize) -> SdOpenResult {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/sd/open", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("limit", limit.to_string())])
            .header("X-Request-ID", &request_id)
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => return SdOpenResult::failed(e.to_string(), request_id),
        };

        let status = resp.status();
        if !status.is_success() {
            return SdOpenResult::failed(format!("sd_open_status_{}", status.as_u16()), request_id);
        }

        let payload: SdOpenPayload = match resp.json().await {
            Ok(p) => p,
            Err(e) => return SdOpenResult::failed(format!("sd_open_decode: {e}"), request_id),
        };

        let request_id = payload.request_id.unwrap_or(request_id);
        if !payload.ok {
            return SdOpenResult::failed(
                payload.error.unwrap_or_else(|| "sd_open_error".to_string()),
                request_id,
            );
        }

        let count_returned = if payload.count_returned > 0 {
            payload.count_returned
        } else {
            payload.items.len()
        };

        SdOpenResult {
            ok: true,
            items: payload.items,
            count_returned,
            error: None,
            request_id,
        }
    }
}
