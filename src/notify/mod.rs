//! Notification fan-out: queue updates and escalations to chat.
//!
//! The service owns the "safe send" policy: a forbidden response is handed
//! to observability (the bot was removed from the chat), any other failure
//! is logged and absorbed. The upstream poller resends on the next
//! composition change, which gives at-least-once delivery without retry
//! bookkeeping here.

use std::sync::Arc;

use tracing::{info, warn};

use crate::chat::{ChatSender, SendError};
use crate::escalation::EscalationAction;
use crate::observability::ObservabilityService;
use crate::routing::{pick_destinations, Destination};
use crate::runtime::{sync::ConfigSync, ConfigHandle};
use crate::sd::Ticket;

pub struct NotificationService {
    chat: Arc<dyn ChatSender>,
    config: ConfigHandle,
    sync: Option<Arc<ConfigSync>>,
    observability: Arc<ObservabilityService>,
}

impl NotificationService {
    pub fn new(
        chat: Arc<dyn ChatSender>,
        config: ConfigHandle,
        sync: Option<Arc<ConfigSync>>,
        observability: Arc<ObservabilityService>,
    ) -> Self {
        Self {
            chat,
            config,
            sync,
            observability,
        }
    }

    /// Main queue notification: route the items, send the text everywhere it
    /// belongs, raise the admin alert when nowhere qualifies.
    pub async fn notify_main(&self, items: &[Ticket], text: &str) {
        if let Some(sync) = &self.sync {
            sync.refresh().await;
        }

        let cfg = self.config.load();
        let dests = pick_destinations(
            items,
            &cfg.routing.rules,
            cfg.routing.default_dest,
            &cfg.routing.bindings,
        );

        if dests.is_empty() {
            self.observability.handle_no_destination(items).await;
            return;
        }

        for dest in dests {
            self.send_safe(dest, text, "routing.main").await;
        }
    }

    /// Escalation messages: each action already carries its destination.
    pub async fn notify_escalation(&self, actions: &[EscalationAction]) {
        if actions.is_empty() {
            return;
        }
        if let Some(sync) = &self.sync {
            sync.refresh().await;
        }
        if !self.config.load().escalation.enabled {
            return;
        }

        for action in actions {
            let text = build_escalation_text(action, chrono::Utc::now());
            self.send_safe(action.dest, &text, "routing.escalation").await;
        }
    }

    async fn send_safe(&self, dest: Destination, text: &str, context: &str) {
        match self.chat.send_message(dest, text).await {
            Ok(()) => {
                info!(dest = %dest, context, "notification sent");
            }
            Err(SendError::Forbidden(reason)) => {
                warn!(dest = %dest, context, error = %reason, "forbidden send");
                self.observability
                    .handle_forbidden_send(dest, &reason, context)
                    .await;
            }
            Err(e) => {
                warn!(dest = %dest, context, error = %e, "send failed, will retry on next change");
            }
        }
    }
}

/// Escalation message body: timestamp line, the configured mention, one line
/// per ticket.
pub fn build_escalation_text(
    action: &EscalationAction,
    now: chrono::DateTime<chrono::Utc>,
) -> String {
    let mut lines = vec![format!(
        "🚨 Escalation: tickets not taken into work in time ({})",
        now.format("%Y-%m-%d %H:%M:%S")
    )];
    if !action.mention.is_empty() {
        lines.push(format!("{} please pick these up.", action.mention));
    }
    lines.push(String::new());
    for item in &action.items {
        let id = item
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "?".to_string());
        lines.push(format!("- #{id}: {}", item.name()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::RecordingSender;
    use crate::client::WebClient;
    use crate::observability::ObservabilityConfig;
    use crate::runtime::{ConfigSource, RuntimeConfig};
    use crate::sd::ticket_from_value;
    use serde_json::json;

    fn observability(chat: Arc<RecordingSender>, config: ConfigHandle) -> Arc<ObservabilityService> {
        Arc::new(ObservabilityService::new(
            chat,
            config,
            Arc::new(WebClient::new("http://127.0.0.1:1", 0.3, 3.0)),
            None,
            Some(Destination::new(999, None)),
            String::new(),
            ObservabilityConfig::default(),
        ))
    }

    fn config_with(routing: serde_json::Value, escalation: serde_json::Value) -> ConfigHandle {
        let handle = ConfigHandle::new_empty();
        handle.store(RuntimeConfig::from_json(
            &json!({"version": 1, "routing": routing, "escalation": escalation}),
            ConfigSource::Web,
        ));
        handle
    }

    #[tokio::test]
    async fn notify_main_routes_by_rules() {
        let sender = Arc::new(RecordingSender::new());
        let config = config_with(
            json!({
                "rules": [
                    {"dest": {"chat_id": 10}, "keywords": ["vip"]},
                    {"dest": {"chat_id": 20}, "service_ids": [101]},
                ],
                "default_dest": {},
            }),
            json!({"enabled": false}),
        );
        let service = NotificationService::new(
            sender.clone(),
            config.clone(),
            None,
            observability(sender.clone(), config),
        );

        let items = vec![ticket_from_value(json!({"Id": 1, "Name": "VIP ticket", "ServiceId": 101}))];
        service.notify_main(&items, "queue update").await;

        let sent = sender.messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0.chat_id, 10);
        assert_eq!(sent[1].0.chat_id, 20);
        assert_eq!(sent[0].1, "queue update");
    }

    #[tokio::test]
    async fn notify_main_without_destinations_raises_admin_alert() {
        let sender = Arc::new(RecordingSender::new());
        let config = ConfigHandle::new_empty();
        let service = NotificationService::new(
            sender.clone(),
            config.clone(),
            None,
            observability(sender.clone(), config),
        );

        let items = vec![ticket_from_value(json!({"Id": 1, "Name": "t"}))];
        service.notify_main(&items, "queue update").await;

        // No routing send; exactly the admin alert went out.
        let sent = sender.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.chat_id, 999);
        assert!(sent[0].1.contains("Ticket without destination"));
    }

    #[tokio::test]
    async fn forbidden_send_is_reported_to_observability() {
        let sender = Arc::new(RecordingSender::with_forbidden(vec![10]));
        let config = config_with(
            json!({"rules": [], "default_dest": {"chat_id": 10}}),
            json!({"enabled": false}),
        );
        let service = NotificationService::new(
            sender.clone(),
            config.clone(),
            None,
            observability(sender.clone(), config),
        );

        let items = vec![ticket_from_value(json!({"Id": 1, "Name": "t"}))];
        service.notify_main(&items, "queue update").await;

        // The routing send failed; the forbidden-send admin alert got through.
        let sent = sender.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.chat_id, 999);
        assert!(sent[0].1.contains("Chat send forbidden"));
    }

    #[tokio::test]
    async fn escalation_skipped_when_disabled() {
        let sender = Arc::new(RecordingSender::new());
        let config = ConfigHandle::new_empty();
        let service = NotificationService::new(
            sender.clone(),
            config.clone(),
            None,
            observability(sender.clone(), config),
        );

        let action = EscalationAction {
            dest: Destination::new(10, None),
            mention: "@duty".to_string(),
            items: vec![ticket_from_value(json!({"Id": 5, "Name": "stuck"}))],
        };
        service.notify_escalation(&[action]).await;
        assert!(sender.messages().is_empty());
    }

    #[tokio::test]
    async fn escalation_sends_when_enabled() {
        let sender = Arc::new(RecordingSender::new());
        let config = config_with(
            json!({"rules": [], "default_dest": {}}),
            json!({"enabled": true, "after_s": 60, "rules": [{"dest": {"chat_id": 10}}]}),
        );
        let service = NotificationService::new(
            sender.clone(),
            config.clone(),
            None,
            observability(sender.clone(), config),
        );

        let action = EscalationAction {
            dest: Destination::new(10, Some(7)),
            mention: "@duty".to_string(),
            items: vec![ticket_from_value(json!({"Id": 5, "Name": "stuck"}))],
        };
        service.notify_escalation(&[action]).await;

        let sent = sender.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::new(10, Some(7)));
        assert!(sent[0].1.contains("- #5: stuck"));
        assert!(sent[0].1.contains("@duty"));
    }

    #[test]
    fn escalation_text_shape() {
        let action = EscalationAction {
            dest: Destination::new(1, None),
            mention: "@ops".to_string(),
            items: vec![
                ticket_from_value(json!({"Id": 5, "Name": "Printer down"})),
                ticket_from_value(json!({"Id": 8, "Name": "VPN broken"})),
            ],
        };
        let now = chrono::DateTime::from_timestamp(1_722_500_000, 0).unwrap();
        let text = build_escalation_text(&action, now);
        assert!(text.starts_with("🚨 Escalation"));
        assert!(text.contains("@ops please pick these up."));
        assert!(text.contains("- #5: Printer down"));
        assert!(text.contains("- #8: VPN broken"));
    }
}
