//! Config validation tests: the write-path contract the web enforces and
//! the bot re-checks on every pulled snapshot.

use opsbridge::runtime::validate::{validate_config, ValidationErrorKind};
use serde_json::json;

#[test]
fn full_config_shape_validates() {
    let cfg = json!({
        "routing": {
            "rules": [
                {
                    "dest": {"chat_id": 10, "thread_id": 2},
                    "keywords": ["vip", "urgent"],
                    "service_ids": [101, 102],
                    "customer_ids": [7],
                    "creator_ids": [7001],
                    "creator_company_ids": [9001],
                },
            ],
            "default_dest": {"chat_id": 99},
            "service_id_field": "ServiceId",
            "customer_id_field": "CustomerId",
            "creator_id_field": "CreatorId",
            "creator_company_id_field": "CreatorCompanyId",
        },
        "escalation": {
            "enabled": true,
            "after_s": 900,
            "rules": [
                {"dest": {"chat_id": 500}, "mention": "@duty", "filter": {"service_ids": [101]}},
            ],
        },
    });
    validate_config(&cfg).unwrap();
}

#[test]
fn missing_sections_are_rejected_with_paths() {
    let err = validate_config(&json!({})).unwrap_err();
    assert_eq!(err.path, "routing");

    let err = validate_config(&json!({
        "routing": {"rules": [], "default_dest": {}},
    }))
    .unwrap_err();
    assert_eq!(err.path, "escalation");

    let err = validate_config(&json!({
        "routing": {"default_dest": {}},
        "escalation": {"enabled": false},
    }))
    .unwrap_err();
    assert_eq!(err.path, "routing.rules");
}

#[test]
fn invalid_destination_is_rejected() {
    let cfg = json!({
        "routing": {"rules": [{"dest": {"chat_id": "x"}}], "default_dest": {}},
        "escalation": {"enabled": false},
    });
    let err = validate_config(&cfg).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::Invalid);
    assert_eq!(err.path, "routing.rules[0].dest");
}

#[test]
fn int_as_text_chat_id_is_accepted() {
    let cfg = json!({
        "routing": {"rules": [{"dest": {"chat_id": "-100555"}}], "default_dest": {}},
        "escalation": {"enabled": false},
    });
    validate_config(&cfg).unwrap();
}

#[test]
fn disabled_escalation_skips_enabled_only_checks() {
    let cfg = json!({
        "routing": {"rules": [], "default_dest": {}},
        "escalation": {"enabled": false, "after_s": -5},
    });
    validate_config(&cfg).unwrap();

    // Enabled, the same shape fails.
    let cfg = json!({
        "routing": {"rules": [], "default_dest": {}},
        "escalation": {"enabled": true, "after_s": -5, "rules": [{"dest": {"chat_id": 1}}]},
    });
    let err = validate_config(&cfg).unwrap_err();
    assert_eq!(err.path, "escalation.after_s");
}

#[test]
fn non_boolean_enabled_is_wrong_type() {
    let cfg = json!({
        "routing": {"rules": [], "default_dest": {}},
        "escalation": {"enabled": "yes"},
    });
    let err = validate_config(&cfg).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::WrongType);
    assert_eq!(err.path, "escalation.enabled");
}

#[test]
fn string_bound_applies_anywhere_in_the_document() {
    let cfg = json!({
        "routing": {"rules": [], "default_dest": {}},
        "escalation": {"enabled": false},
        "note": "x".repeat(4097),
    });
    let err = validate_config(&cfg).unwrap_err();
    assert_eq!(err.kind, ValidationErrorKind::TooLong);
}

#[test]
fn error_display_carries_path_and_message() {
    let err = validate_config(&json!({})).unwrap_err();
    let shown = err.to_string();
    assert!(shown.contains("routing"));
    assert!(shown.contains("required"));
}
