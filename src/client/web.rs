//! Health/readiness probing of the web service, with a small TTL cache so
//! chat handlers and observability probes do not hammer the web on every
//! call. Also fetches the rollback-frequency stats used by the
//! rollback-storm alert.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Default total timeout for a health/ready probe.
pub const DEFAULT_TIMEOUT_S: f64 = 1.5;
/// Default TTL for the cached health/ready pair.
pub const DEFAULT_CACHE_TTL_S: f64 = 3.0;

/// Outcome of probing a single endpoint.
#[derive(Debug, Clone)]
pub struct WebCheckResult {
    pub ok: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub request_id: String,
}

/// Rollback stats as served by `GET /config/rollbacks`.
#[derive(Debug, Clone, Deserialize)]
pub struct RollbackStatsPayload {
    pub count: i64,
    #[serde(default)]
    pub last_rollback_at: Option<String>,
    pub window_s: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum WebClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned status {0}")]
    Status(u16),
}

/// Probing client for the web service.
pub struct WebClient {
    http: reqwest::Client,
    base_url: String,
    cache_ttl: Duration,
    cache: Mutex<Option<(Instant, WebCheckResult, WebCheckResult)>>,
}

impl WebClient {
    pub fn new(base_url: &str, timeout_s: f64, cache_ttl_s: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache_ttl: Duration::from_secs_f64(cache_ttl_s),
            cache: Mutex::new(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self, path: &str, request_id: &str) -> WebCheckResult {
        let url = format!("{}{}", self.base_url, path);
        let started = Instant::now();

        let outcome = self
            .http
            .get(&url)
            .header("X-Request-ID", request_id)
            .send()
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(resp) => {
                let status = resp.status().as_u16();
                WebCheckResult {
                    ok: resp.status().is_success(),
                    status: Some(status),
                    error: None,
                    duration_ms,
                    request_id: request_id.to_string(),
                }
            }
            Err(e) => WebCheckResult {
                ok: false,
                status: None,
                error: Some(e.to_string()),
                duration_ms,
                request_id: request_id.to_string(),
            },
        }
    }

    /// Probe `/health` and `/ready`, serving the cached pair when fresh
    /// unless `force` is set.
    pub async fn check_health_ready(&self, force: bool) -> (WebCheckResult, WebCheckResult) {
        let mut cache = self.cache.lock().await;

        if !force {
            if let Some((at, health, ready)) = cache.as_ref() {
                if at.elapsed() <= self.cache_ttl {
                    return (health.clone(), ready.clone());
                }
            }
        }

        let request_id = Uuid::new_v4().to_string();
        let (health, ready) = tokio::join!(
            self.probe("/health", &request_id),
            self.probe("/ready", &request_id)
        );

        *cache = Some((Instant::now(), health.clone(), ready.clone()));
        (health, ready)
    }

    /// Fetch rollback-frequency stats (admin endpoint).
    pub async fn get_rollbacks(
        &self,
        window_s: i64,
        admin_token: &str,
    ) -> Result<RollbackStatsPayload, WebClientError> {
        let resp = self
            .http
            .get(format!("{}/config/rollbacks", self.base_url))
            .query(&[("window_s", window_s.to_string())])
            .header("Authorization", format!("Bearer {admin_token}"))
            .header("X-Request-ID", Uuid::new_v4().to_string())
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(WebClientError::Status(resp.status().as_u16()));
        }

        Ok(resp.json().await?)
    }
}
