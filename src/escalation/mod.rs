//! Escalation of tickets that dwell in the open queue unattended.
//!
//! The open queue only ever contains tickets in the open status, so a ticket
//! being taken into work is observable as its disappearance from the queue.
//! That makes the tracker simple and assignee-agnostic:
//!
//! 1. every successful poll records `seen_at` for newly appeared tickets;
//! 2. tickets that vanished are dropped from all tracking (taken, closed or
//!    transferred; either way, no longer ours to escalate);
//! 3. a ticket still present past `after_s` that matches at least one rule
//!    fires exactly once per continuous open interval.
//!
//! State persists through the [`StateStore`] after every pass so the
//! one-shot guarantee holds across restarts.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::routing::{filter_matches, parse_destination, parse_filter, Destination, FieldBindings, RuleFilter};
use crate::sd::Ticket;
use crate::state::StateStore;

/// State store key for the escalation blob.
pub const STATE_KEY: &str = "escalation.v1";

/// One escalation rule: who to ping, and which tickets qualify.
/// An empty filter matches every ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub dest: Destination,
    #[serde(default)]
    pub mention: String,
    #[serde(default)]
    pub filter: RuleFilter,
}

/// Escalation policy from the runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub enabled: bool,
    pub after_s: i64,
    pub rules: Vec<EscalationRule>,
    pub bindings: FieldBindings,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            after_s: 0,
            rules: Vec::new(),
            bindings: FieldBindings::default(),
        }
    }
}

/// Parse escalation rules from operator JSON. Total: rules without a valid
/// destination are dropped with a warning. Unlike routing rules, an empty
/// filter is legal (it means "escalate everything").
pub fn parse_escalation_rules(value: &serde_json::Value) -> Vec<EscalationRule> {
    let Some(arr) = value.as_array() else {
        return Vec::new();
    };

    let mut rules = Vec::with_capacity(arr.len());
    for (idx, raw) in arr.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            warn!(rule = idx, "escalation rule is not an object, dropped");
            continue;
        };
        let Some(dest) = obj.get("dest").and_then(parse_destination) else {
            warn!(rule = idx, "escalation rule has no valid dest, dropped");
            continue;
        };
        let mention = obj
            .get("mention")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();
        let filter = match obj.get("filter").and_then(|f| f.as_object()) {
            Some(f) => parse_filter(f),
            None => parse_filter(obj),
        };
        rules.push(EscalationRule {
            dest,
            mention,
            filter,
        });
    }
    rules
}

/// One escalation to deliver: tickets coalesced per `(dest, mention)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationAction {
    pub dest: Destination,
    pub mention: String,
    pub items: Vec<Ticket>,
}

/// Dwell-time tracker with one-shot fire semantics.
pub struct EscalationManager {
    store: Option<Arc<dyn StateStore>>,
    store_key: String,
    /// Ticket id → unix ts when first observed in the open queue.
    seen_at: HashMap<i64, f64>,
    /// Ticket id → unix ts of its single escalation event.
    escalated_at: HashMap<i64, f64>,
}

impl EscalationManager {
    /// Construct the manager, loading prior state from the store when one is
    /// configured. Non-integer keys in the stored blob are coerced out.
    pub fn new(store: Option<Arc<dyn StateStore>>, store_key: &str) -> Self {
        let mut manager = Self {
            store,
            store_key: store_key.to_string(),
            seen_at: HashMap::new(),
            escalated_at: HashMap::new(),
        };
        manager.load();
        manager
    }

    fn load(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let data = match store.get_json(&self.store_key) {
            Ok(Some(v)) => v,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, key = %self.store_key, "failed to load escalation state, starting empty");
                return;
            }
        };

        self.seen_at = load_ts_map(data.get("seen_at"));
        self.escalated_at = load_ts_map(data.get("escalated_at"));
    }

    fn save(&self) {
        let Some(store) = &self.store else {
            return;
        };
        let payload = serde_json::json!({
            "seen_at": stringify_keys(&self.seen_at),
            "escalated_at": stringify_keys(&self.escalated_at),
        });
        if let Err(e) = store.set_json(&self.store_key, &payload) {
            warn!(error = %e, key = %self.store_key, "failed to persist escalation state");
        }
    }

    /// Number of tickets currently tracked as open (for status surfaces).
    pub fn tracked_count(&self) -> usize {
        self.seen_at.len()
    }

    /// One escalation pass over the current open queue.
    ///
    /// Updates the state maps, persists them, and returns the actions to
    /// deliver now. Fires at most once per ticket per continuous open dwell.
    pub fn process(
        &mut self,
        items: &[Ticket],
        now: f64,
        cfg: &EscalationConfig,
    ) -> Vec<EscalationAction> {
        let mut id_to_item: HashMap<i64, &Ticket> = HashMap::new();
        for item in items {
            let Some(id) = item.id().filter(|id| *id > 0) else {
                continue;
            };
            id_to_item.entry(id).or_insert(item);
            self.seen_at.entry(id).or_insert(now);
        }

        // A ticket gone from the open queue was taken, closed or transferred;
        // forget it so a later reappearance starts a fresh dwell interval.
        self.seen_at.retain(|id, _| id_to_item.contains_key(id));
        self.escalated_at.retain(|id, _| id_to_item.contains_key(id));

        // Decide which tickets fire this pass.
        let mut fired: Vec<i64> = Vec::new();
        let mut current_ids: Vec<i64> = id_to_item.keys().copied().collect();
        current_ids.sort_unstable();

        for id in current_ids {
            if self.escalated_at.contains_key(&id) {
                continue;
            }
            let seen = self.seen_at.get(&id).copied().unwrap_or(now);
            if now - seen < cfg.after_s as f64 {
                continue;
            }
            let item = id_to_item[&id];
            let matches_any = cfg
                .rules
                .iter()
                .any(|r| r.filter.is_empty() || filter_matches(item, &r.filter, &cfg.bindings));
            if !matches_any {
                continue;
            }
            self.escalated_at.insert(id, now);
            fired.push(id);
        }

        // Build one action per rule, tickets coalesced per (dest, mention).
        let mut actions: Vec<EscalationAction> = Vec::new();
        if !fired.is_empty() {
            for rule in &cfg.rules {
                let matched: Vec<Ticket> = fired
                    .iter()
                    .filter_map(|id| id_to_item.get(id).copied())
                    .filter(|item| {
                        rule.filter.is_empty() || filter_matches(item, &rule.filter, &cfg.bindings)
                    })
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    continue;
                }
                match actions
                    .iter_mut()
                    .find(|a| a.dest == rule.dest && a.mention == rule.mention)
                {
                    Some(existing) => {
                        for t in matched {
                            if !existing.items.contains(&t) {
                                existing.items.push(t);
                            }
                        }
                    }
                    None => actions.push(EscalationAction {
                        dest: rule.dest,
                        mention: rule.mention.clone(),
                        items: matched,
                    }),
                }
            }
        }

        self.save();
        actions
    }
}

fn load_ts_map(value: Option<&serde_json::Value>) -> HashMap<i64, f64> {
    let Some(obj) = value.and_then(|v| v.as_object()) else {
        return HashMap::new();
    };
    obj.iter()
        .filter_map(|(k, v)| {
            let id = k.trim().parse::<i64>().ok()?;
            let ts = v.as_f64()?;
            Some((id, ts))
        })
        .collect()
}

fn stringify_keys(map: &HashMap<i64, f64>) -> serde_json::Value {
    let mut out = serde_json::Map::with_capacity(map.len());
    for (k, v) in map {
        if let Some(n) = serde_json::Number::from_f64(*v) {
            out.insert(k.to_string(), serde_json::Value::Number(n));
        }
    }
    serde_json::Value::Object(out)
}
