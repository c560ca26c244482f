//! Config sync: periodic pull of the versioned config from the web service.
//!
//! On a successful fetch with a newer version the snapshot is re-validated
//! locally (the web already validated on write, but the bot defends its own
//! ingress) and swapped atomically. Any failure keeps the old snapshot; the
//! bot never crashes over a config pull.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::validate::validate_config;
use super::{ConfigHandle, ConfigSource, RuntimeConfig};
use crate::sd::to_int;

/// Default pull interval.
pub const DEFAULT_INTERVAL_S: u64 = 30;
/// Default throttle for inline `refresh()` calls from the notify path.
pub const DEFAULT_REFRESH_TTL_S: f64 = 5.0;

pub struct ConfigSync {
    http: reqwest::Client,
    base_url: String,
    handle: ConfigHandle,
    local_version: Mutex<Option<i64>>,
    last_refresh: Mutex<Option<Instant>>,
    refresh_ttl: Duration,
}

impl ConfigSync {
    pub fn new(base_url: &str, handle: ConfigHandle, timeout_s: f64, refresh_ttl_s: f64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(timeout_s))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            handle,
            local_version: Mutex::new(None),
            last_refresh: Mutex::new(None),
            refresh_ttl: Duration::from_secs_f64(refresh_ttl_s),
        }
    }

    pub fn handle(&self) -> ConfigHandle {
        self.handle.clone()
    }

    /// Throttled refresh for inline callers (the notify path nudges this
    /// before routing). No-op when a pull happened within the TTL.
    pub async fn refresh(&self) {
        {
            let Ok(guard) = self.last_refresh.lock() else { return };
            if let Some(at) = *guard {
                if at.elapsed() < self.refresh_ttl {
                    return;
                }
            }
        }
        self.pull().await;
    }

    /// One pull. Swaps the snapshot only on a strictly newer valid version.
    pub async fn pull(&self) {
        if let Ok(mut guard) = self.last_refresh.lock() {
            *guard = Some(Instant::now());
        }

        let url = format!("{}/config", self.base_url);
        let resp = self
            .http
            .get(&url)
            .header("X-Request-ID", Uuid::new_v4().to_string())
            .send()
            .await;

        let resp = match resp {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "config pull failed, keeping current snapshot");
                return;
            }
        };
        if !resp.status().is_success() {
            warn!(status = resp.status().as_u16(), "config pull got non-success status");
            return;
        }

        let body: serde_json::Value = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "config pull returned undecodable body");
                return;
            }
        };

        let Some(version) = to_int(body.get("version")) else {
            warn!("config pull returned no version, keeping current snapshot");
            return;
        };

        {
            let Ok(local) = self.local_version.lock() else { return };
            if let Some(lv) = *local {
                if version <= lv {
                    debug!(version, local = lv, "config unchanged");
                    return;
                }
            }
        }

        // Defense in depth: never swap in a config the validator rejects,
        // even if the web somehow served one.
        if let Err(e) = validate_config(&body) {
            warn!(version, error = %e, "pulled config failed local validation, keeping current snapshot");
            return;
        }

        let snapshot = RuntimeConfig::from_json(&body, ConfigSource::Web);
        self.handle.store(snapshot);
        if let Ok(mut local) = self.local_version.lock() {
            *local = Some(version);
        }
        info!(version, "runtime config updated");
    }

    /// Periodic pull loop. Jitter spreads multiple bots across the interval.
    pub async fn run(&self, interval_s: u64, jitter_s: u64, cancel: CancellationToken) {
        info!(interval_s, "config sync started");
        loop {
            let jitter = if jitter_s > 0 {
                use rand::Rng;
                rand::thread_rng().gen_range(0..jitter_s)
            } else {
                0
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("config sync stopped");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(interval_s + jitter)) => {}
            }

            self.pull().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pull_against_dead_web_keeps_snapshot() {
        let handle = ConfigHandle::new_empty();
        let sync = ConfigSync::new("http://127.0.0.1:1", handle.clone(), 0.3, 5.0);
        sync.pull().await;
        // Snapshot unchanged, still the empty cold-start config.
        assert!(handle.load().version.is_none());
    }

    #[tokio::test]
    async fn refresh_is_ttl_throttled() {
        let handle = ConfigHandle::new_empty();
        let sync = ConfigSync::new("http://127.0.0.1:1", handle, 0.3, 60.0);
        sync.refresh().await;
        let first = *sync.last_refresh.lock().unwrap();
        // Within the TTL the second refresh must not pull again.
        sync.refresh().await;
        let second = *sync.last_refresh.lock().unwrap();
        assert_eq!(first, second);
    }
}
