//! Runtime configuration: the typed, hot-swappable snapshot the bot routes
//! and escalates with.
//!
//! The on-wire shape stays untyped JSON (operators edit it through the web
//! API); ingest builds a closed set of typed records once per version and
//! swaps the whole snapshot atomically via `arc-swap`, so readers never see
//! a torn config. Ingest is total: unparseable fragments degrade to their
//! empty/default form rather than failing the swap.

pub mod sync;
pub mod validate;

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::escalation::{parse_escalation_rules, EscalationConfig};
use crate::routing::{parse_destination, parse_rules, Destination, FieldBindings, RouteRule};
use crate::sd::to_int;

/// Where the active snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Cold start, nothing pulled yet: no rules, no default destination.
    Empty,
    /// Pulled from the web service's config endpoint.
    Web,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Empty => write!(f, "empty"),
            ConfigSource::Web => write!(f, "web"),
        }
    }
}

/// Routing section of the runtime configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingConfig {
    pub rules: Vec<RouteRule>,
    pub default_dest: Option<Destination>,
    pub bindings: FieldBindings,
}

/// The immutable runtime snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub version: Option<i64>,
    pub source: ConfigSource,
    pub routing: RoutingConfig,
    pub escalation: EscalationConfig,
}

impl RuntimeConfig {
    /// The cold-start snapshot: no rules, no default destination, escalation
    /// off. Every ticket routed against it raises a no-destination alert,
    /// which is exactly the operator signal we want.
    pub fn empty() -> Self {
        Self {
            version: None,
            source: ConfigSource::Empty,
            routing: RoutingConfig {
                bindings: FieldBindings::default(),
                ..RoutingConfig::default()
            },
            escalation: EscalationConfig::default(),
        }
    }

    /// Build a snapshot from the config JSON served by the web.
    pub fn from_json(value: &serde_json::Value, source: ConfigSource) -> Self {
        let version = to_int(value.get("version"));

        let routing_obj = value.get("routing").and_then(|v| v.as_object());
        let routing = match routing_obj {
            Some(obj) => {
                let bindings = bindings_from(obj, &FieldBindings::default());
                RoutingConfig {
                    rules: obj
                        .get("rules")
                        .map(parse_rules)
                        .unwrap_or_default(),
                    default_dest: obj.get("default_dest").and_then(parse_destination),
                    bindings,
                }
            }
            None => RoutingConfig {
                bindings: FieldBindings::default(),
                ..RoutingConfig::default()
            },
        };

        let escalation_obj = value.get("escalation").and_then(|v| v.as_object());
        let escalation = match escalation_obj {
            Some(obj) => EscalationConfig {
                enabled: obj.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false),
                after_s: to_int(obj.get("after_s")).unwrap_or(0),
                rules: obj
                    .get("rules")
                    .map(parse_escalation_rules)
                    .unwrap_or_default(),
                // Escalation may bind its own field names; absent ones follow
                // the routing section.
                bindings: bindings_from(obj, &routing.bindings),
            },
            None => EscalationConfig::default(),
        };

        Self {
            version,
            source,
            routing,
            escalation,
        }
    }
}

fn bindings_from(
    obj: &serde_json::Map<String, serde_json::Value>,
    fallback: &FieldBindings,
) -> FieldBindings {
    let field = |key: &str, fallback: &str| -> String {
        obj.get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| fallback.to_string())
    };
    FieldBindings {
        service_id_field: field("service_id_field", &fallback.service_id_field),
        customer_id_field: field("customer_id_field", &fallback.customer_id_field),
        creator_id_field: field("creator_id_field", &fallback.creator_id_field),
        creator_company_id_field: field(
            "creator_company_id_field",
            &fallback.creator_company_id_field,
        ),
    }
}

/// Shared handle to the active snapshot. Cloning is cheap; `load` returns a
/// consistent immutable snapshot, `store` replaces it atomically.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<RuntimeConfig>>,
}

impl ConfigHandle {
    pub fn new_empty() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(RuntimeConfig::empty())),
        }
    }

    pub fn load(&self) -> Arc<RuntimeConfig> {
        self.inner.load_full()
    }

    pub fn store(&self, config: RuntimeConfig) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_snapshot_has_no_destinations() {
        let cfg = RuntimeConfig::empty();
        assert!(cfg.routing.rules.is_empty());
        assert!(cfg.routing.default_dest.is_none());
        assert!(!cfg.escalation.enabled);
        assert_eq!(cfg.source, ConfigSource::Empty);
    }

    #[test]
    fn from_json_parses_full_shape() {
        let cfg = RuntimeConfig::from_json(
            &json!({
                "version": 7,
                "routing": {
                    "rules": [
                        {"dest": {"chat_id": 10}, "keywords": ["vip"]},
                    ],
                    "default_dest": {"chat_id": 99},
                    "service_id_field": "SvcId",
                },
                "escalation": {
                    "enabled": true,
                    "after_s": 900,
                    "rules": [{"dest": {"chat_id": 500}, "mention": "@duty"}],
                },
            }),
            ConfigSource::Web,
        );

        assert_eq!(cfg.version, Some(7));
        assert_eq!(cfg.routing.rules.len(), 1);
        assert_eq!(cfg.routing.default_dest, Some(Destination::new(99, None)));
        assert_eq!(cfg.routing.bindings.service_id_field, "SvcId");
        // Unset bindings keep their defaults.
        assert_eq!(cfg.routing.bindings.customer_id_field, "CustomerId");
        assert!(cfg.escalation.enabled);
        assert_eq!(cfg.escalation.after_s, 900);
        // Escalation bindings follow routing when not bound separately.
        assert_eq!(cfg.escalation.bindings.service_id_field, "SvcId");
    }

    #[test]
    fn from_json_tolerates_garbage() {
        let cfg = RuntimeConfig::from_json(&json!({"routing": 42}), ConfigSource::Web);
        assert!(cfg.routing.rules.is_empty());
        assert!(cfg.routing.default_dest.is_none());

        let cfg = RuntimeConfig::from_json(&json!([]), ConfigSource::Web);
        assert!(cfg.routing.rules.is_empty());
    }

    #[test]
    fn empty_default_dest_object_reads_as_none() {
        let cfg = RuntimeConfig::from_json(
            &json!({"routing": {"rules": [], "default_dest": {}}}),
            ConfigSource::Web,
        );
        assert!(cfg.routing.default_dest.is_none());
    }

    #[test]
    fn handle_swaps_atomically() {
        let handle = ConfigHandle::new_empty();
        assert!(handle.load().version.is_none());

        let mut cfg = RuntimeConfig::empty();
        cfg.version = Some(3);
        cfg.source = ConfigSource::Web;
        handle.store(cfg);

        let seen = handle.load();
        assert_eq!(seen.version, Some(3));
        assert_eq!(seen.source, ConfigSource::Web);
    }
}
