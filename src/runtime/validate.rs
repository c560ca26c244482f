//! Candidate-config validation, shared by the write path on the web side and
//! (defense in depth) by the bot before swapping a pulled snapshot.
//!
//! A config that fails here never touches the database and never replaces a
//! live snapshot. Errors carry the JSON path and a category so the operator
//! gets `400 {error, path, message}` instead of a silent misroute.

use crate::routing::parse_destination;
use crate::sd::to_int;

/// Longest string accepted anywhere in a config document.
pub const MAX_STRING_LEN: usize = 4096;

/// Validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    Missing,
    WrongType,
    Invalid,
    TooLong,
}

impl std::fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationErrorKind::Missing => write!(f, "missing"),
            ValidationErrorKind::WrongType => write!(f, "wrong_type"),
            ValidationErrorKind::Invalid => write!(f, "invalid"),
            ValidationErrorKind::TooLong => write!(f, "too_long"),
        }
    }
}

/// A categorized validation failure with the offending JSON path.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{path}: {message}")]
pub struct ConfigValidationError {
    pub kind: ValidationErrorKind,
    pub path: String,
    pub message: String,
}

impl ConfigValidationError {
    fn new(kind: ValidationErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

type Result<T = ()> = std::result::Result<T, ConfigValidationError>;

/// Validate a candidate configuration document.
pub fn validate_config(cfg: &serde_json::Value) -> Result {
    let root = cfg.as_object().ok_or_else(|| {
        ConfigValidationError::new(ValidationErrorKind::WrongType, "$", "config must be an object")
    })?;

    // Global bounds before the semantic checks.
    check_bounds(cfg, "$")?;

    let routing = root
        .get("routing")
        .ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::Missing, "routing", "routing section is required")
        })?
        .as_object()
        .ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::WrongType, "routing", "routing must be an object")
        })?;

    validate_routing(routing)?;

    let escalation = root
        .get("escalation")
        .ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::Missing,
                "escalation",
                "escalation section is required",
            )
        })?
        .as_object()
        .ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::WrongType,
                "escalation",
                "escalation must be an object",
            )
        })?;

    validate_escalation(escalation)?;

    Ok(())
}

fn validate_routing(routing: &serde_json::Map<String, serde_json::Value>) -> Result {
    let rules = routing
        .get("rules")
        .ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::Missing, "routing.rules", "rules list is required")
        })?
        .as_array()
        .ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::WrongType, "routing.rules", "rules must be a list")
        })?;

    for (idx, rule) in rules.iter().enumerate() {
        let path = format!("routing.rules[{idx}]");
        let obj = rule.as_object().ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::WrongType, &path, "rule must be an object")
        })?;
        validate_dest_required(obj.get("dest"), &format!("{path}.dest"))?;
        validate_criteria_shapes(obj, &path)?;
    }

    // default_dest must be present; `{}` means "no default".
    let default_dest = routing.get("default_dest").ok_or_else(|| {
        ConfigValidationError::new(
            ValidationErrorKind::Missing,
            "routing.default_dest",
            "default_dest is required (use {} for none)",
        )
    })?;
    let obj = default_dest.as_object().ok_or_else(|| {
        ConfigValidationError::new(
            ValidationErrorKind::WrongType,
            "routing.default_dest",
            "default_dest must be an object",
        )
    })?;
    if !obj.is_empty() && obj.get("chat_id").map_or(false, |v| !v.is_null()) {
        if parse_destination(default_dest).is_none() {
            return Err(ConfigValidationError::new(
                ValidationErrorKind::Invalid,
                "routing.default_dest.chat_id",
                "chat_id must be an integer",
            ));
        }
    }

    validate_bindings(routing, "routing")?;
    Ok(())
}

fn validate_escalation(escalation: &serde_json::Map<String, serde_json::Value>) -> Result {
    let enabled = escalation
        .get("enabled")
        .ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::Missing,
                "escalation.enabled",
                "enabled flag is required",
            )
        })?
        .as_bool()
        .ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::WrongType,
                "escalation.enabled",
                "enabled must be a boolean",
            )
        })?;

    if !enabled {
        return Ok(());
    }

    match to_int(escalation.get("after_s")) {
        Some(v) if v > 0 => {}
        Some(_) => {
            return Err(ConfigValidationError::new(
                ValidationErrorKind::Invalid,
                "escalation.after_s",
                "after_s must be positive",
            ))
        }
        None => {
            return Err(ConfigValidationError::new(
                ValidationErrorKind::Missing,
                "escalation.after_s",
                "after_s is required when escalation is enabled",
            ))
        }
    }

    let rules = escalation
        .get("rules")
        .and_then(|v| v.as_array())
        .ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::Missing,
                "escalation.rules",
                "at least one rule is required when escalation is enabled",
            )
        })?;
    if rules.is_empty() {
        return Err(ConfigValidationError::new(
            ValidationErrorKind::Invalid,
            "escalation.rules",
            "at least one rule is required when escalation is enabled",
        ));
    }

    for (idx, rule) in rules.iter().enumerate() {
        let path = format!("escalation.rules[{idx}]");
        let obj = rule.as_object().ok_or_else(|| {
            ConfigValidationError::new(ValidationErrorKind::WrongType, &path, "rule must be an object")
        })?;
        validate_dest_required(obj.get("dest"), &format!("{path}.dest"))?;
    }

    validate_bindings(escalation, "escalation")?;
    Ok(())
}

fn validate_dest_required(dest: Option<&serde_json::Value>, path: &str) -> Result {
    let dest = dest.ok_or_else(|| {
        ConfigValidationError::new(ValidationErrorKind::Missing, path, "dest is required")
    })?;
    if parse_destination(dest).is_none() {
        return Err(ConfigValidationError::new(
            ValidationErrorKind::Invalid,
            path,
            "dest.chat_id must be an integer",
        ));
    }
    Ok(())
}

const CRITERIA_KEYS: [&str; 5] = [
    "keywords",
    "service_ids",
    "customer_ids",
    "creator_ids",
    "creator_company_ids",
];

fn validate_criteria_shapes(
    obj: &serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Result {
    for key in CRITERIA_KEYS {
        let Some(value) = obj.get(key) else { continue };
        let arr = value.as_array().ok_or_else(|| {
            ConfigValidationError::new(
                ValidationErrorKind::WrongType,
                format!("{path}.{key}"),
                format!("{key} must be a list"),
            )
        })?;
        if key == "keywords" {
            for (i, kw) in arr.iter().enumerate() {
                if !kw.is_string() {
                    return Err(ConfigValidationError::new(
                        ValidationErrorKind::WrongType,
                        format!("{path}.{key}[{i}]"),
                        "keyword must be a string",
                    ));
                }
            }
        } else {
            for (i, id) in arr.iter().enumerate() {
                if to_int(Some(id)).is_none() {
                    return Err(ConfigValidationError::new(
                        ValidationErrorKind::Invalid,
                        format!("{path}.{key}[{i}]"),
                        "id must be an integer",
                    ));
                }
            }
        }
    }
    Ok(())
}

const BINDING_KEYS: [&str; 4] = [
    "service_id_field",
    "customer_id_field",
    "creator_id_field",
    "creator_company_id_field",
];

fn validate_bindings(obj: &serde_json::Map<String, serde_json::Value>, section: &str) -> Result {
    for key in BINDING_KEYS {
        let Some(value) = obj.get(key) else { continue };
        let Some(s) = value.as_str() else {
            return Err(ConfigValidationError::new(
                ValidationErrorKind::WrongType,
                format!("{section}.{key}"),
                "field binding must be a string",
            ));
        };
        if s.trim().is_empty() {
            return Err(ConfigValidationError::new(
                ValidationErrorKind::Invalid,
                format!("{section}.{key}"),
                "field binding must not be empty",
            ));
        }
    }
    Ok(())
}

/// Walk the whole document: every string bounded, every number i64-clean.
fn check_bounds(value: &serde_json::Value, path: &str) -> Result {
    match value {
        serde_json::Value::String(s) => {
            if s.len() > MAX_STRING_LEN {
                return Err(ConfigValidationError::new(
                    ValidationErrorKind::TooLong,
                    path,
                    format!("string exceeds {MAX_STRING_LEN} bytes"),
                ));
            }
        }
        serde_json::Value::Number(n) => {
            if n.as_i64().is_none() && n.as_u64().is_some() {
                // u64 beyond i64::MAX does not fit the wire contract.
                return Err(ConfigValidationError::new(
                    ValidationErrorKind::Invalid,
                    path,
                    "integer does not fit in 64 signed bits",
                ));
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, v) in arr.iter().enumerate() {
                check_bounds(v, &format!("{path}[{i}]"))?;
            }
        }
        serde_json::Value::Object(obj) => {
            for (k, v) in obj {
                if k.len() > MAX_STRING_LEN {
                    return Err(ConfigValidationError::new(
                        ValidationErrorKind::TooLong,
                        path,
                        format!("key exceeds {MAX_STRING_LEN} bytes"),
                    ));
                }
                check_bounds(v, &format!("{path}.{k}"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_valid() -> serde_json::Value {
        json!({
            "routing": {
                "rules": [
                    {"dest": {"chat_id": 1, "thread_id": null}},
                ],
                "default_dest": {"chat_id": 2, "thread_id": null},
            },
            "escalation": {"enabled": false},
        })
    }

    #[test]
    fn accepts_minimal_valid_config() {
        validate_config(&minimal_valid()).unwrap();
    }

    #[test]
    fn rejects_empty_document() {
        let err = validate_config(&json!({})).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Missing);
        assert_eq!(err.path, "routing");
    }

    #[test]
    fn rejects_invalid_rule_dest() {
        let cfg = json!({
            "routing": {"rules": [{"dest": {"chat_id": "x"}}], "default_dest": {}},
            "escalation": {"enabled": false},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Invalid);
        assert!(err.path.starts_with("routing.rules[0].dest"));
    }

    #[test]
    fn empty_default_dest_means_none_and_is_valid() {
        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}},
            "escalation": {"enabled": false},
        });
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn enabled_escalation_requires_threshold_and_rules() {
        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}},
            "escalation": {"enabled": true},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.path, "escalation.after_s");

        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}},
            "escalation": {"enabled": true, "after_s": 0, "rules": [{"dest": {"chat_id": 1}}]},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::Invalid);

        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}},
            "escalation": {"enabled": true, "after_s": 60, "rules": []},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.path, "escalation.rules");

        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}},
            "escalation": {"enabled": true, "after_s": 60, "rules": [{"dest": {"chat_id": 1}}]},
        });
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn rejects_blank_field_binding() {
        let cfg = json!({
            "routing": {"rules": [], "default_dest": {}, "service_id_field": "  "},
            "escalation": {"enabled": false},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.path, "routing.service_id_field");
    }

    #[test]
    fn rejects_oversized_string() {
        let cfg = json!({
            "routing": {
                "rules": [{"dest": {"chat_id": 1}, "keywords": ["a".repeat(5000)]}],
                "default_dest": {},
            },
            "escalation": {"enabled": false},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::TooLong);
    }

    #[test]
    fn rejects_non_array_criteria() {
        let cfg = json!({
            "routing": {
                "rules": [{"dest": {"chat_id": 1}, "service_ids": "101"}],
                "default_dest": {},
            },
            "escalation": {"enabled": false},
        });
        let err = validate_config(&cfg).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::WrongType);
        assert!(err.path.contains("service_ids"));
    }
}
