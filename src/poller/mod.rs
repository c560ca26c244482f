//! Open-queue polling loop.
//!
//! One sequential loop: fetch the open queue, compare the id-set snapshot
//! against the last sent one, notify on composition change only, then hand
//! the same items to the escalation engine. Renames never trigger a send;
//! when one does go out it carries the full current list with current names.
//!
//! Failures back off exponentially up to a cap and recover to the base
//! interval on the first success. Fetching goes through [`OpenQueueSource`]
//! so tests can script tick sequences without a network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{SdOpenResult, SdWebClient};
use crate::escalation::EscalationManager;
use crate::notify::NotificationService;
use crate::runtime::ConfigHandle;
use crate::sd::{ids_snapshot, normalize_for_message, NormalizedTicket};
use crate::state::unix_now;

/// Default base polling interval.
pub const DEFAULT_BASE_INTERVAL_S: f64 = 30.0;
/// Default backoff cap.
pub const DEFAULT_MAX_BACKOFF_S: f64 = 300.0;
/// Default fetch limit.
pub const DEFAULT_FETCH_LIMIT: usize = 200;

/// Something that can produce the current open queue.
#[async_trait]
pub trait OpenQueueSource: Send + Sync {
    async fn fetch_open(&self, limit: usize) -> SdOpenResult;
}

#[async_trait]
impl OpenQueueSource for SdWebClient {
    async fn fetch_open(&self, limit: usize) -> SdOpenResult {
        self.get_open(limit).await
    }
}

/// Poller counters and the sent snapshot, shared read-only with status
/// surfaces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollerState {
    pub runs: u64,
    pub failures: u64,
    pub consecutive_failures: u64,

    pub last_run_ts: Option<f64>,
    pub last_success_ts: Option<f64>,

    pub last_error: Option<String>,
    pub last_duration_ms: Option<u64>,

    /// Queue snapshot, by id composition only.
    pub last_sent_snapshot: Option<String>,
    pub last_sent_ids: Option<Vec<i64>>,

    pub last_sent_count: Option<usize>,
    pub last_sent_at: Option<f64>,
}

/// Poller tunables.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub base_interval_s: f64,
    pub max_backoff_s: f64,
    pub fetch_limit: usize,
    /// SD base URL for deep links in queue messages.
    pub sd_base_url: String,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            base_interval_s: DEFAULT_BASE_INTERVAL_S,
            max_backoff_s: DEFAULT_MAX_BACKOFF_S,
            fetch_limit: DEFAULT_FETCH_LIMIT,
            sd_base_url: String::new(),
        }
    }
}

/// Queue message body: header plus one line per ticket, id order.
pub fn build_queue_text(normalized: &[NormalizedTicket]) -> String {
    if normalized.is_empty() {
        return "📌 No open tickets ✅".to_string();
    }
    let mut lines = vec![format!("📌 Open tickets: {}", normalized.len())];
    for t in normalized {
        lines.push(format!("- #{}: {}", t.id, t.name));
    }
    lines.join("\n")
}

pub struct OpenQueuePoller<S: OpenQueueSource> {
    source: S,
    notifier: Arc<NotificationService>,
    escalation: EscalationManager,
    config: ConfigHandle,
    state: Arc<RwLock<PollerState>>,
    settings: PollerSettings,
    interval_s: f64,
}

impl<S: OpenQueueSource> OpenQueuePoller<S> {
    pub fn new(
        source: S,
        notifier: Arc<NotificationService>,
        escalation: EscalationManager,
        config: ConfigHandle,
        settings: PollerSettings,
    ) -> Self {
        let interval_s = settings.base_interval_s;
        Self {
            source,
            notifier,
            escalation,
            config,
            state: Arc::new(RwLock::new(PollerState::default())),
            settings,
            interval_s,
        }
    }

    /// Shared handle to the poller counters for status surfaces.
    pub fn state_handle(&self) -> Arc<RwLock<PollerState>> {
        self.state.clone()
    }

    /// One poll iteration: fetch, diff, notify, escalate. Returns the delay
    /// before the next iteration.
    pub async fn tick(&mut self) -> Duration {
        let started = Instant::now();
        {
            let mut state = self.state.write().await;
            state.runs += 1;
            state.last_run_ts = Some(unix_now());
        }

        let res = self.source.fetch_open(self.settings.fetch_limit).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        if !res.ok {
            let error = res.error.unwrap_or_else(|| "sd_open_error".to_string());
            self.interval_s = (self.interval_s * 2.0)
                .max(self.settings.base_interval_s)
                .min(self.settings.max_backoff_s);

            let mut state = self.state.write().await;
            state.failures += 1;
            state.consecutive_failures += 1;
            state.last_duration_ms = Some(duration_ms);
            state.last_error = Some(error.clone());
            warn!(
                error = %error,
                consecutive = state.consecutive_failures,
                next_interval_s = self.interval_s,
                request_id = %res.request_id,
                "open-queue fetch failed"
            );
            return Duration::from_secs_f64(self.interval_s);
        }

        self.interval_s = self.settings.base_interval_s;
        let (snapshot, ids) = ids_snapshot(&res.items);

        let should_send = {
            let mut state = self.state.write().await;
            state.last_success_ts = Some(unix_now());
            state.last_error = None;
            state.consecutive_failures = 0;
            state.last_duration_ms = Some(duration_ms);
            state.last_sent_snapshot.as_deref() != Some(snapshot.as_str())
        };

        if should_send {
            let normalized = normalize_for_message(&res.items, &self.settings.sd_base_url);
            let text = build_queue_text(&normalized);
            info!(count = ids.len(), "open-queue composition changed, notifying");
            self.notifier.notify_main(&res.items, &text).await;

            let mut state = self.state.write().await;
            state.last_sent_count = Some(ids.len());
            state.last_sent_ids = Some(ids);
            state.last_sent_snapshot = Some(snapshot);
            state.last_sent_at = Some(unix_now());
        } else {
            debug!("open-queue composition unchanged");
        }

        // Escalation runs on every successful fetch, send or no send.
        let cfg = self.config.load();
        if cfg.escalation.enabled {
            let actions = self
                .escalation
                .process(&res.items, unix_now(), &cfg.escalation);
            if !actions.is_empty() {
                info!(actions = actions.len(), "escalations due");
                self.notifier.notify_escalation(&actions).await;
            }
        }

        Duration::from_secs_f64(self.interval_s)
    }

    /// Run until cancelled. The sleep is interruptible; a cancellation during
    /// a fetch takes effect once the fetch resolves.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            base_interval_s = self.settings.base_interval_s,
            max_backoff_s = self.settings.max_backoff_s,
            "open-queue poller started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            let delay = self.tick().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("open-queue poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sd::ticket_from_value;
    use serde_json::json;

    #[test]
    fn queue_text_empty_and_nonempty() {
        assert_eq!(build_queue_text(&[]), "📌 No open tickets ✅");

        let items = vec![
            ticket_from_value(json!({"Id": 2, "Name": "B"})),
            ticket_from_value(json!({"Id": 1, "Name": "A"})),
        ];
        let normalized = normalize_for_message(&items, "https://sd.example.com");
        let text = build_queue_text(&normalized);
        assert!(text.starts_with("📌 Open tickets: 2"));
        // Id order, regardless of fetch order.
        let a = text.find("- #1: A").unwrap();
        let b = text.find("- #2: B").unwrap();
        assert!(a < b);
    }
}
