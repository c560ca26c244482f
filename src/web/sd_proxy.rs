//! SD-facing client of the web service.
//!
//! The web is the only party that talks to ServiceDesk directly; the bot
//! goes through `/sd/open`. A short TTL cache absorbs bursts (several bots,
//! chat commands and the poller hitting the proxy in the same few seconds)
//! without serving stale queues.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::sd::Ticket;

/// Default total timeout for the upstream SD call.
pub const DEFAULT_TIMEOUT_S: f64 = 3.0;
/// Default response cache TTL.
pub const DEFAULT_CACHE_TTL_S: f64 = 3.0;

#[derive(Debug, thiserror::Error)]
pub enum SdProxyError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("SD returned status {0}")]
    Status(u16),
    #[error("SD payload undecodable: {0}")]
    Decode(String),
}

pub struct SdProxy {
    http: reqwest::Client,
    base_url: String,
    api_token: String,
    cache_ttl: Duration,
    cache: Mutex<Option<(Instant, usize, Vec<Ticket>)>>,
}

impl SdProxy {
    pub fn new(base_url: &str, api_token: &str, timeout_s: f64, cache_ttl_s: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
            cache_ttl: Duration::from_secs_f64(cache_ttl_s),
            cache: Mutex::new(None),
        }
    }

    /// Fetch the open queue from SD, serving the cache when fresh.
    pub async fn fetch_open(&self, limit: usize) -> Result<Vec<Ticket>, SdProxyError> {
        {
            let cache = self.cache.lock().await;
            if let Some((at, cached_limit, items)) = cache.as_ref() {
                if *cached_limit == limit && at.elapsed() <= self.cache_ttl {
                    return Ok(items.clone());
                }
            }
        }

        let items = self.fetch_upstream(limit).await?;

        let mut cache = self.cache.lock().await;
        *cache = Some((Instant::now(), limit, items.clone()));
        Ok(items)
    }

    async fn fetch_upstream(&self, limit: usize) -> Result<Vec<Ticket>, SdProxyError> {
        let url = format!("{}/api/tasks", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("status", "open".to_string()), ("limit", limit.to_string())])
            .header("Authorization", format!("Bearer {}", self.api_token))
            .send()
            .await
            .map_err(|e| SdProxyError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SdProxyError::Status(resp.status().as_u16()));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SdProxyError::Decode(e.to_string()))?;

        // SD deployments differ: some return a bare array, some wrap it.
        let raw_items = match &body {
            serde_json::Value::Array(arr) => arr.clone(),
            serde_json::Value::Object(obj) => obj
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        let items: Vec<Ticket> = raw_items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(Ticket(map)),
                _ => None,
            })
            .take(limit)
            .collect();

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_sd_is_an_error_not_a_panic() {
        let proxy = SdProxy::new("http://127.0.0.1:1", "token", 0.3, 3.0);
        let err = proxy.fetch_open(10).await.unwrap_err();
        assert!(matches!(err, SdProxyError::Http(_)));
    }
}
