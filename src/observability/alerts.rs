//! Admin alert message builders.
//!
//! Texts give the operator enough to diagnose without leaking ticket bodies
//! into the admin chat: ids, field values the router looked at, config
//! version, and the probe outcomes.

use crate::client::WebCheckResult;
use crate::routing::{Destination, FieldBindings};
use crate::sd::Ticket;

/// Format a unix timestamp for alert texts.
pub fn fmt_ts(ts: Option<f64>) -> String {
    match ts {
        Some(ts) => chrono::DateTime::from_timestamp(ts as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "n/a".to_string()),
        None => "n/a".to_string(),
    }
}

fn opt_str<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

/// "A ticket arrived and the router produced no destination."
pub fn no_destination(
    ticket: Option<&Ticket>,
    rules_count: usize,
    default_dest_present: bool,
    bindings: &FieldBindings,
    config_version: Option<i64>,
    config_source: &str,
) -> String {
    let (id, name, sid, cid) = match ticket {
        Some(t) => (
            opt_str(t.id()),
            t.name(),
            opt_str(t.field_int(&bindings.service_id_field)),
            opt_str(t.field_int(&bindings.customer_id_field)),
        ),
        None => ("n/a".to_string(), String::new(), "n/a".to_string(), "n/a".to_string()),
    };

    let lines = vec![
        "⚠️ Ticket without destination".to_string(),
        String::new(),
        "Ticket:".to_string(),
        format!("- id: {id}"),
        format!("- name: {name}"),
        format!("- {}: {sid}", bindings.service_id_field),
        format!("- {}: {cid}", bindings.customer_id_field),
        String::new(),
        "Routing:".to_string(),
        format!("- rules_count: {rules_count}"),
        format!(
            "- default_dest_present: {}",
            if default_dest_present { "yes" } else { "no" }
        ),
        format!("- config_version: {}", opt_str(config_version)),
        format!("- config_source: {config_source}"),
        String::new(),
        "Action: review the routing config (rules/default_dest).".to_string(),
    ];
    lines.join("\n")
}

/// "The web backend keeps failing its health or readiness probe."
pub fn web_degraded(health: &WebCheckResult, ready: &WebCheckResult, attempts: u32) -> String {
    [
        "🛑 Web backend degraded".to_string(),
        String::new(),
        format!("- attempts: {attempts}"),
        format!(
            "- /health: ok={} status={} error={}",
            health.ok,
            opt_str(health.status),
            health.error.as_deref().unwrap_or("none"),
        ),
        format!(
            "- /ready: ok={} status={} error={}",
            ready.ok,
            opt_str(ready.status),
            ready.error.as_deref().unwrap_or("none"),
        ),
        String::new(),
        "Action: check the web service and its dependencies.".to_string(),
    ]
    .join("\n")
}

/// "The state store stopped answering."
pub fn state_store_degraded(error: &str, last_ok_ts: Option<f64>) -> String {
    [
        "🛑 State store degraded".to_string(),
        String::new(),
        format!("- error: {error}"),
        format!("- last_ok: {}", fmt_ts(last_ok_ts)),
        String::new(),
        "Escalation state may go stale until the store recovers.".to_string(),
    ]
    .join("\n")
}

/// "Someone is rolling the config back repeatedly."
pub fn rollback_storm(count: i64, window_s: i64, last_at: Option<&str>) -> String {
    [
        "⚠️ Frequent config rollbacks".to_string(),
        String::new(),
        format!("- rollbacks: {count} within {window_s}s"),
        format!("- last_rollback_at: {}", last_at.unwrap_or("n/a")),
        String::new(),
        "Action: check recent config changes with the operators.".to_string(),
    ]
    .join("\n")
}

/// "A chat refused our message."
pub fn forbidden_send(dest: Destination, error: &str, context: &str) -> String {
    [
        "⚠️ Chat send forbidden".to_string(),
        String::new(),
        format!("- destination: {dest}"),
        format!("- context: {context}"),
        format!("- error: {error}"),
        String::new(),
        "The bot was likely removed from the chat or the thread is gone.".to_string(),
    ]
    .join("\n")
}
