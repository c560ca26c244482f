//! Notification routing: destinations, rules, and the pure matching engine.
//!
//! Rules are operator-edited JSON, so parsing is total: malformed rules are
//! dropped with a warning, never propagated as errors. Matching itself does
//! no I/O and reads no clocks; given equal inputs it returns equal outputs.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sd::{norm, to_int, Ticket};

// ============================================================================
// Model
// ============================================================================

/// Where a message lands: a chat, optionally a topic/thread inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
}

impl Destination {
    pub fn new(chat_id: i64, thread_id: Option<i64>) -> Self {
        Self { chat_id, thread_id }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.thread_id {
            Some(t) => write!(f, "{}:{}", self.chat_id, t),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

/// The four ticket fields id-based criteria read, bound by name so operators
/// can follow SD schema changes without a redeploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBindings {
    pub service_id_field: String,
    pub customer_id_field: String,
    pub creator_id_field: String,
    pub creator_company_id_field: String,
}

impl Default for FieldBindings {
    fn default() -> Self {
        Self {
            service_id_field: "ServiceId".to_string(),
            customer_id_field: "CustomerId".to_string(),
            creator_id_field: "CreatorId".to_string(),
            creator_company_id_field: "CreatorCompanyId".to_string(),
        }
    }
}

/// Criteria shared by routing rules and escalation filters.
///
/// Empty criterion sets never match on their own; a filter where *all* sets
/// are empty is "match everything" for escalation and invalid for routing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFilter {
    /// Normalized (lowercased, trimmed) keywords matched as substrings of the
    /// normalized ticket name.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub service_ids: Vec<i64>,
    #[serde(default)]
    pub customer_ids: Vec<i64>,
    #[serde(default)]
    pub creator_ids: Vec<i64>,
    #[serde(default)]
    pub creator_company_ids: Vec<i64>,
}

impl RuleFilter {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.service_ids.is_empty()
            && self.customer_ids.is_empty()
            && self.creator_ids.is_empty()
            && self.creator_company_ids.is_empty()
    }
}

/// One routing rule: a destination plus at least one non-empty criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub dest: Destination,
    #[serde(flatten)]
    pub filter: RuleFilter,
}

// ============================================================================
// Parsing (total: bad input is dropped, not raised)
// ============================================================================

/// Parse a destination object. `chat_id` accepts an integer or an
/// integer-as-text; a `thread_id` of `0` normalizes to absent.
pub fn parse_destination(value: &serde_json::Value) -> Option<Destination> {
    let obj = value.as_object()?;
    let chat_id = to_int(obj.get("chat_id"))?;
    let thread_id = to_int(obj.get("thread_id")).filter(|t| *t != 0);
    Some(Destination { chat_id, thread_id })
}

fn parse_id_list(value: Option<&serde_json::Value>) -> Vec<i64> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| to_int(Some(v))).collect())
        .unwrap_or_default()
}

fn parse_keywords(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(norm)
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Parse the filter criteria shared by routing rules and escalation rules.
pub fn parse_filter(obj: &serde_json::Map<String, serde_json::Value>) -> RuleFilter {
    RuleFilter {
        keywords: parse_keywords(obj.get("keywords")),
        service_ids: parse_id_list(obj.get("service_ids")),
        customer_ids: parse_id_list(obj.get("customer_ids")),
        creator_ids: parse_id_list(obj.get("creator_ids")),
        creator_company_ids: parse_id_list(obj.get("creator_company_ids")),
    }
}

/// Parse a list of routing rules, dropping anything malformed: missing or
/// non-integer `chat_id`, or a rule with no criterion at all.
pub fn parse_rules(value: &serde_json::Value) -> Vec<RouteRule> {
    let Some(arr) = value.as_array() else {
        return Vec::new();
    };

    let mut rules = Vec::with_capacity(arr.len());
    for (idx, raw) in arr.iter().enumerate() {
        let Some(obj) = raw.as_object() else {
            warn!(rule = idx, "routing rule is not an object, dropped");
            continue;
        };
        let Some(dest) = obj.get("dest").and_then(parse_destination) else {
            warn!(rule = idx, "routing rule has no valid dest, dropped");
            continue;
        };
        let filter = parse_filter(obj);
        if filter.is_empty() {
            warn!(rule = idx, "routing rule has no criteria, dropped");
            continue;
        }
        rules.push(RouteRule { dest, filter });
    }
    rules
}

// ============================================================================
// Matching engine
// ============================================================================

/// Why a ticket matched (or not), for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchExplanation {
    pub matched: bool,
    pub reason: String,
}

/// First matching criterion for one ticket against one filter, as
/// `criterion:value`, or `None` when nothing matches.
fn first_match_reason(item: &Ticket, filter: &RuleFilter, bindings: &FieldBindings) -> Option<String> {
    if !filter.keywords.is_empty() {
        let name = norm(&item.name());
        if let Some(kw) = filter.keywords.iter().find(|k| name.contains(k.as_str())) {
            return Some(format!("keyword:{kw}"));
        }
    }

    let id_criteria: [(&str, &str, &[i64]); 4] = [
        (
            "service_id",
            bindings.service_id_field.as_str(),
            &filter.service_ids,
        ),
        (
            "customer_id",
            bindings.customer_id_field.as_str(),
            &filter.customer_ids,
        ),
        (
            "creator_id",
            bindings.creator_id_field.as_str(),
            &filter.creator_ids,
        ),
        (
            "creator_company_id",
            bindings.creator_company_id_field.as_str(),
            &filter.creator_company_ids,
        ),
    ];

    for (label, field, wanted) in id_criteria {
        if wanted.is_empty() {
            continue;
        }
        if let Some(v) = item.field_int(field) {
            if wanted.contains(&v) {
                return Some(format!("{label}:{v}"));
            }
        }
    }

    None
}

/// True when the ticket satisfies any of the filter's non-empty criteria.
pub fn filter_matches(item: &Ticket, filter: &RuleFilter, bindings: &FieldBindings) -> bool {
    first_match_reason(item, filter, bindings).is_some()
}

/// Destinations of every rule matched by any of `items`, in rule order,
/// deduplicated.
pub fn match_destinations(
    items: &[Ticket],
    rules: &[RouteRule],
    bindings: &FieldBindings,
) -> Vec<Destination> {
    let mut out: Vec<Destination> = Vec::new();
    for rule in rules {
        let hit = items
            .iter()
            .any(|item| filter_matches(item, &rule.filter, bindings));
        if hit && !out.contains(&rule.dest) {
            out.push(rule.dest);
        }
    }
    out
}

/// Matched destinations, falling back to the default destination when no rule
/// fires. An empty result means "no destination configured at all" and the
/// caller must raise the admin alert.
pub fn pick_destinations(
    items: &[Ticket],
    rules: &[RouteRule],
    default_dest: Option<Destination>,
    bindings: &FieldBindings,
) -> Vec<Destination> {
    let matched = match_destinations(items, rules, bindings);
    if !matched.is_empty() {
        return matched;
    }
    match default_dest {
        Some(d) => vec![d],
        None => Vec::new(),
    }
}

/// Per-item match diagnostics: the first rule criterion that fired, or
/// `no_match`.
pub fn explain_matches(
    items: &[Ticket],
    rules: &[RouteRule],
    bindings: &FieldBindings,
) -> Vec<MatchExplanation> {
    items
        .iter()
        .map(|item| {
            let reason = rules
                .iter()
                .find_map(|rule| first_match_reason(item, &rule.filter, bindings));
            match reason {
                Some(reason) => MatchExplanation {
                    matched: true,
                    reason,
                },
                None => MatchExplanation {
                    matched: false,
                    reason: "no_match".to_string(),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sd::ticket_from_value;
    use serde_json::json;

    fn ticket(v: serde_json::Value) -> Ticket {
        ticket_from_value(v)
    }

    fn bindings() -> FieldBindings {
        FieldBindings::default()
    }

    #[test]
    fn parse_destination_zero_thread_id() {
        let dest = parse_destination(&json!({"chat_id": "123", "thread_id": 0}));
        assert_eq!(dest, Some(Destination::new(123, None)));
    }

    #[test]
    fn parse_destination_rejects_bad_chat_id() {
        assert_eq!(parse_destination(&json!({"chat_id": "x"})), None);
        assert_eq!(parse_destination(&json!({"thread_id": 5})), None);
        assert_eq!(parse_destination(&json!("not an object")), None);
    }

    #[test]
    fn parse_rules_skips_invalid_and_empty_rules() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 1}, "keywords": []},
            {"dest": {"chat_id": "x"}},
            {"dest": {"chat_id": 2}, "keywords": ["VIP"]},
        ]));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].dest, Destination::new(2, None));
        // Keywords are normalized at parse time.
        assert_eq!(rules[0].filter.keywords, vec!["vip".to_string()]);
    }

    #[test]
    fn match_destinations_keywords_and_ids() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 10}, "keywords": ["vip"]},
            {"dest": {"chat_id": 20}, "service_ids": [101]},
        ]));
        let items = vec![ticket(json!({"Name": "VIP ticket", "ServiceId": 101}))];
        let matched = match_destinations(&items, &rules, &bindings());
        assert_eq!(
            matched,
            vec![Destination::new(10, None), Destination::new(20, None)]
        );
    }

    #[test]
    fn match_destinations_creator_fields() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 30}, "creator_ids": [7001]},
            {"dest": {"chat_id": 40}, "creator_company_ids": [9001]},
        ]));
        let items = vec![ticket(
            json!({"Name": "ticket", "CreatorId": 7001, "CreatorCompanyId": 9001}),
        )];
        let matched = match_destinations(&items, &rules, &bindings());
        assert!(matched.contains(&Destination::new(30, None)));
        assert!(matched.contains(&Destination::new(40, None)));
    }

    #[test]
    fn match_destinations_dedups_preserving_rule_order() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 10}, "keywords": ["vip"]},
            {"dest": {"chat_id": 20}, "keywords": ["urgent"]},
            {"dest": {"chat_id": 10}, "service_ids": [101]},
        ]));
        let items = vec![ticket(
            json!({"Name": "urgent vip", "ServiceId": 101}),
        )];
        let matched = match_destinations(&items, &rules, &bindings());
        assert_eq!(
            matched,
            vec![Destination::new(10, None), Destination::new(20, None)]
        );
    }

    #[test]
    fn unknown_field_value_never_matches_id_rule() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 20}, "service_ids": [101]},
        ]));
        let items = vec![ticket(json!({"Name": "t", "ServiceId": "abc"}))];
        assert!(match_destinations(&items, &rules, &bindings()).is_empty());
    }

    #[test]
    fn pick_destinations_falls_back_to_default() {
        let default = Destination::new(99, None);
        let picked = pick_destinations(
            &[ticket(json!({"Name": "anything"}))],
            &[],
            Some(default),
            &bindings(),
        );
        assert_eq!(picked, vec![default]);

        let picked = pick_destinations(
            &[ticket(json!({"Name": "anything"}))],
            &[],
            None,
            &bindings(),
        );
        assert!(picked.is_empty());
    }

    #[test]
    fn explain_matches_contains_reason() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 10}, "keywords": ["vip"]},
        ]));
        let items = vec![
            ticket(json!({"Name": "vip ticket"})),
            ticket(json!({"Name": "regular"})),
        ];
        let out = explain_matches(&items, &rules, &bindings());
        assert!(out[0].matched);
        assert_eq!(out[0].reason, "keyword:vip");
        assert!(!out[1].matched);
        assert_eq!(out[1].reason, "no_match");
    }

    #[test]
    fn matching_is_deterministic() {
        let rules = parse_rules(&json!([
            {"dest": {"chat_id": 10}, "keywords": ["vip"]},
            {"dest": {"chat_id": 20}, "service_ids": [101, 102]},
        ]));
        let items = vec![ticket(json!({"Name": "VIP", "ServiceId": 102}))];
        let first = match_destinations(&items, &rules, &bindings());
        for _ in 0..10 {
            assert_eq!(match_destinations(&items, &rules, &bindings()), first);
        }
    }
}
