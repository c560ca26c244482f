//! Routing engine tests against the public API: rule parsing, matching,
//! fallback and diagnostics.

use opsbridge::routing::{
    explain_matches, match_destinations, parse_destination, parse_rules, pick_destinations,
    Destination, FieldBindings,
};
use opsbridge::sd::ticket_from_value;
use opsbridge::Ticket;
use serde_json::json;

fn ticket(v: serde_json::Value) -> Ticket {
    ticket_from_value(v)
}

fn bindings() -> FieldBindings {
    FieldBindings::default()
}

#[test]
fn destination_accepts_int_and_text_chat_id() {
    assert_eq!(
        parse_destination(&json!({"chat_id": 123})),
        Some(Destination::new(123, None))
    );
    assert_eq!(
        parse_destination(&json!({"chat_id": "123", "thread_id": 4})),
        Some(Destination::new(123, Some(4)))
    );
    assert_eq!(
        parse_destination(&json!({"chat_id": "123", "thread_id": 0})),
        Some(Destination::new(123, None))
    );
    assert_eq!(parse_destination(&json!({"chat_id": "abc"})), None);
    assert_eq!(parse_destination(&json!({})), None);
}

#[test]
fn route_by_keyword_and_id_together() {
    // One ticket matching both a keyword rule and a service-id rule lands
    // in both destinations, in rule order.
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
fn default_destination_fallback() {
    let default = Destination::new(99, None);
    let items = vec![ticket(json!({"Name": "anything"}))];

    // No rules, default configured: exactly the default fires.
    assert_eq!(
        pick_destinations(&items, &[], Some(default), &bindings()),
        vec![default]
    );

    // No rules, no default: empty set, caller must alert.
    assert!(pick_destinations(&items, &[], None, &bindings()).is_empty());
}

#[test]
fn rules_win_over_default() {
    let rules = parse_rules(&json!([
        {"dest": {"chat_id": 10}, "keywords": ["vip"]},
    ]));
    let default = Destination::new(99, None);
    let items = vec![ticket(json!({"Name": "vip"}))];

    assert_eq!(
        pick_destinations(&items, &rules, Some(default), &bindings()),
        vec![Destination::new(10, None)]
    );
}

#[test]
fn custom_field_bindings_are_honored() {
    let rules = parse_rules(&json!([
        {"dest": {"chat_id": 20}, "service_ids": [101]},
    ]));
    let bindings = FieldBindings {
        service_id_field: "SvcId".to_string(),
        ..FieldBindings::default()
    };
    let hit = vec![ticket(json!({"Name": "t", "SvcId": 101}))];
    let miss = vec![ticket(json!({"Name": "t", "ServiceId": 101}))];

    assert_eq!(match_destinations(&hit, &rules, &bindings).len(), 1);
    assert!(match_destinations(&miss, &rules, &bindings).is_empty());
}

#[test]
fn keyword_matching_is_case_insensitive_substring() {
    let rules = parse_rules(&json!([
        {"dest": {"chat_id": 10}, "keywords": ["  VIP  "]},
    ]));
    let items = vec![ticket(json!({"Name": "urgent vip escalated"}))];
    assert_eq!(match_destinations(&items, &rules, &bindings()).len(), 1);
}

#[test]
fn explain_names_the_first_matching_criterion() {
    let rules = parse_rules(&json!([
        {"dest": {"chat_id": 10}, "keywords": ["vip"]},
        {"dest": {"chat_id": 20}, "service_ids": [101]},
    ]));
    let items = vec![
        ticket(json!({"Name": "vip ticket"})),
        ticket(json!({"Name": "plain", "ServiceId": 101})),
        ticket(json!({"Name": "plain"})),
    ];
    let out = explain_matches(&items, &rules, &bindings());
    assert_eq!(out[0].reason, "keyword:vip");
    assert_eq!(out[1].reason, "service_id:101");
    assert!(!out[2].matched);
}

#[test]
fn repeated_calls_on_equal_inputs_return_equal_outputs() {
    let rules = parse_rules(&json!([
        {"dest": {"chat_id": 10, "thread_id": 3}, "keywords": ["vip"], "customer_ids": [55]},
    ]));
    let items = vec![ticket(json!({"Name": "VIP", "CustomerId": 55}))];
    let expected = match_destinations(&items, &rules, &bindings());
    for _ in 0..20 {
        assert_eq!(match_destinations(&items, &rules, &bindings()), expected);
    }
}
