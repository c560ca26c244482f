//! Self-observability: degradation probes and rate-limited admin alerts.
//!
//! Four alert kinds, each with its own limiter window:
//! - no-destination (raised inline by the notify path)
//! - web backend degraded (/health or /ready failing after retries)
//! - state store degraded (ping raising)
//! - rollback storm (too many config rollbacks in a window)
//!
//! A limiter allows at most one alert per window and counts every suppressed
//! attempt; the skipped counter is cumulative and never resets on a
//! successful send. Forbidden chat sends ride the general admin limiter.

pub mod alerts;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chat::ChatSender;
use crate::client::WebClient;
use crate::routing::Destination;
use crate::runtime::ConfigHandle;
use crate::sd::Ticket;
use crate::state::{unix_now, StateStore};

/// One alert kind's rate-limit state.
#[derive(Debug, Clone)]
pub struct AlertLimiter {
    min_interval_s: f64,
    last_sent_at: Option<f64>,
    skipped: u64,
}

impl AlertLimiter {
    pub fn new(min_interval_s: f64) -> Self {
        Self {
            min_interval_s,
            last_sent_at: None,
            skipped: 0,
        }
    }

    /// Whether an alert may fire now. On allow, the window restarts; on
    /// deny, the cumulative skipped counter grows by one.
    pub fn allow(&mut self, now: f64) -> bool {
        if let Some(last) = self.last_sent_at {
            if now - last < self.min_interval_s {
                self.skipped += 1;
                return false;
            }
        }
        self.last_sent_at = Some(now);
        true
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn last_sent_at(&self) -> Option<f64> {
        self.last_sent_at
    }
}

/// Observability tunables. Defaults follow the operational profile: probes
/// every minute, alert windows of 5 to 15 minutes.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub admin_alert_min_interval_s: f64,
    pub web_alert_min_interval_s: f64,
    pub state_alert_min_interval_s: f64,
    pub rollback_alert_min_interval_s: f64,
    pub probe_interval_s: u64,
    pub rollback_window_s: i64,
    pub rollback_threshold: i64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            admin_alert_min_interval_s: 300.0,
            web_alert_min_interval_s: 600.0,
            state_alert_min_interval_s: 600.0,
            rollback_alert_min_interval_s: 900.0,
            probe_interval_s: 60,
            rollback_window_s: 3600,
            rollback_threshold: 3,
        }
    }
}

struct Limiters {
    admin: AlertLimiter,
    web: AlertLimiter,
    state: AlertLimiter,
    rollback: AlertLimiter,
}

/// Snapshot of limiter counters for status surfaces and tests.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertStats {
    pub admin_alerts_skipped_rate_limit: u64,
    pub web_alerts_skipped_rate_limit: u64,
    pub state_alerts_skipped_rate_limit: u64,
    pub rollback_alerts_skipped_rate_limit: u64,
    pub tickets_without_destination_total: u64,
    pub last_ticket_without_destination_at: Option<f64>,
}

pub struct ObservabilityService {
    chat: Arc<dyn ChatSender>,
    config: ConfigHandle,
    web: Arc<WebClient>,
    state_store: Option<Arc<dyn StateStore>>,
    admin_dest: Option<Destination>,
    admin_token: String,
    settings: ObservabilityConfig,
    limiters: Mutex<Limiters>,
    no_dest_total: Mutex<(u64, Option<f64>)>,
}

impl ObservabilityService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chat: Arc<dyn ChatSender>,
        config: ConfigHandle,
        web: Arc<WebClient>,
        state_store: Option<Arc<dyn StateStore>>,
        admin_dest: Option<Destination>,
        admin_token: String,
        settings: ObservabilityConfig,
    ) -> Self {
        let limiters = Limiters {
            admin: AlertLimiter::new(settings.admin_alert_min_interval_s),
            web: AlertLimiter::new(settings.web_alert_min_interval_s),
            state: AlertLimiter::new(settings.state_alert_min_interval_s),
            rollback: AlertLimiter::new(settings.rollback_alert_min_interval_s),
        };
        Self {
            chat,
            config,
            web,
            state_store,
            admin_dest,
            admin_token,
            settings,
            limiters: Mutex::new(limiters),
            no_dest_total: Mutex::new((0, None)),
        }
    }

    pub fn alert_stats(&self) -> AlertStats {
        let limiters = self.limiters.lock();
        let no_dest = self.no_dest_total.lock();
        let (admin, web, state, rollback) = match &limiters {
            Ok(l) => (
                l.admin.skipped(),
                l.web.skipped(),
                l.state.skipped(),
                l.rollback.skipped(),
            ),
            Err(_) => (0, 0, 0, 0),
        };
        let (total, last_at) = no_dest.map(|g| *g).unwrap_or((0, None));
        AlertStats {
            admin_alerts_skipped_rate_limit: admin,
            web_alerts_skipped_rate_limit: web,
            state_alerts_skipped_rate_limit: state,
            rollback_alerts_skipped_rate_limit: rollback,
            tickets_without_destination_total: total,
            last_ticket_without_destination_at: last_at,
        }
    }

    /// Deliver an admin alert; without an admin destination it can only log.
    async fn send_admin(&self, text: String, kind: &str) {
        let Some(dest) = self.admin_dest else {
            warn!(kind, "admin alert suppressed: no admin destination configured");
            return;
        };
        if let Err(e) = self.chat.send_message(dest, &text).await {
            warn!(kind, error = %e, "failed to send admin alert");
        }
    }

    /// A ticket arrived and routing produced no destination.
    pub async fn handle_no_destination(&self, items: &[Ticket]) {
        let now = unix_now();
        if let Ok(mut counters) = self.no_dest_total.lock() {
            counters.0 += 1;
            counters.1 = Some(now);
        }

        let allowed = self
            .limiters
            .lock()
            .map(|mut l| l.admin.allow(now))
            .unwrap_or(false);
        if !allowed {
            info!("no destinations; admin alert skipped by rate limit");
            return;
        }

        let cfg = self.config.load();
        let text = alerts::no_destination(
            items.first(),
            cfg.routing.rules.len(),
            cfg.routing.default_dest.is_some(),
            &cfg.routing.bindings,
            cfg.version,
            &cfg.source.to_string(),
        );
        self.send_admin(text, "no_destination").await;
    }

    /// A chat send came back forbidden (bot removed, thread deleted).
    pub async fn handle_forbidden_send(&self, dest: Destination, error: &str, context: &str) {
        let allowed = self
            .limiters
            .lock()
            .map(|mut l| l.admin.allow(unix_now()))
            .unwrap_or(false);
        if !allowed {
            return;
        }
        let text = alerts::forbidden_send(dest, error, context);
        self.send_admin(text, "forbidden_send").await;
    }

    /// Probe the web backend; alert when /health or /ready keeps failing.
    pub async fn check_web(&self) {
        const ATTEMPTS: u32 = 3;

        let mut last = None;
        for attempt in 0..ATTEMPTS {
            let (health, ready) = self.web.check_health_ready(true).await;
            if health.ok && ready.ok {
                return;
            }
            last = Some((health, ready));
            if attempt + 1 < ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
        let Some((health, ready)) = last else { return };

        let allowed = self
            .limiters
            .lock()
            .map(|mut l| l.web.allow(unix_now()))
            .unwrap_or(false);
        if !allowed {
            return;
        }

        let text = alerts::web_degraded(&health, &ready, ATTEMPTS);
        self.send_admin(text, "web_degraded").await;
    }

    /// Ping the state store; alert on failure with the last-ok timestamp.
    pub async fn check_state_store(&self) {
        let Some(store) = &self.state_store else { return };

        let error = match store.ping() {
            Ok(()) => return,
            Err(e) => e.to_string(),
        };

        let allowed = self
            .limiters
            .lock()
            .map(|mut l| l.state.allow(unix_now()))
            .unwrap_or(false);
        if !allowed {
            return;
        }

        let text = alerts::state_store_degraded(&error, store.last_ok_ts());
        self.send_admin(text, "state_store_degraded").await;
    }

    /// Check config rollback frequency; alert past the threshold.
    pub async fn check_rollbacks(&self) {
        if self.admin_token.is_empty() {
            return;
        }

        let stats = match self
            .web
            .get_rollbacks(self.settings.rollback_window_s, &self.admin_token)
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "rollback stats fetch failed");
                return;
            }
        };

        if stats.count < self.settings.rollback_threshold {
            return;
        }

        let allowed = self
            .limiters
            .lock()
            .map(|mut l| l.rollback.allow(unix_now()))
            .unwrap_or(false);
        if !allowed {
            return;
        }

        let text =
            alerts::rollback_storm(stats.count, stats.window_s, stats.last_rollback_at.as_deref());
        self.send_admin(text, "rollback_storm").await;
    }

    /// Periodic probe loop: web, state store, rollback frequency, once per
    /// probe interval until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_s = self.settings.probe_interval_s,
            "observability probes started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("observability probes stopped");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_secs(self.settings.probe_interval_s)) => {}
            }

            self.check_web().await;
            self.check_state_store().await;
            self.check_rollbacks().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::RecordingSender;
    use crate::sd::ticket_from_value;
    use serde_json::json;

    #[test]
    fn limiter_allows_then_suppresses_within_window() {
        let mut limiter = AlertLimiter::new(600.0);
        assert!(limiter.allow(0.0));
        assert!(!limiter.allow(1.0));
        assert!(!limiter.allow(599.0));
        assert_eq!(limiter.skipped(), 2);
        // Window elapsed: fires again, skipped stays cumulative.
        assert!(limiter.allow(600.0));
        assert_eq!(limiter.skipped(), 2);
        assert!(!limiter.allow(601.0));
        assert_eq!(limiter.skipped(), 3);
    }

    #[test]
    fn limiter_skipped_grows_by_exactly_suppressed_attempts() {
        let mut limiter = AlertLimiter::new(600.0);
        assert!(limiter.allow(0.0));
        for i in 0..27 {
            assert!(!limiter.allow(1.0 + i as f64));
        }
        assert_eq!(limiter.skipped(), 27);
    }

    fn service_with(chat: Arc<dyn ChatSender>, admin_dest: Option<Destination>) -> ObservabilityService {
        ObservabilityService::new(
            chat,
            ConfigHandle::new_empty(),
            Arc::new(WebClient::new("http://127.0.0.1:1", 0.3, 3.0)),
            None,
            admin_dest,
            String::new(),
            ObservabilityConfig::default(),
        )
    }

    #[tokio::test]
    async fn no_destination_alert_is_rate_limited() {
        let sender = Arc::new(RecordingSender::new());
        let service = service_with(sender.clone(), Some(Destination::new(777, None)));
        let items = vec![ticket_from_value(json!({"Id": 1, "Name": "t"}))];

        service.handle_no_destination(&items).await;
        service.handle_no_destination(&items).await;
        service.handle_no_destination(&items).await;

        // One alert through, two suppressed; the counter still saw all three.
        assert_eq!(sender.messages().len(), 1);
        let stats = service.alert_stats();
        assert_eq!(stats.tickets_without_destination_total, 3);
        assert_eq!(stats.admin_alerts_skipped_rate_limit, 2);
    }

    #[tokio::test]
    async fn no_admin_destination_logs_and_skips() {
        let sender = Arc::new(RecordingSender::new());
        let service = service_with(sender.clone(), None);
        let items = vec![ticket_from_value(json!({"Id": 1, "Name": "t"}))];

        service.handle_no_destination(&items).await;
        assert!(sender.messages().is_empty());
    }
}
