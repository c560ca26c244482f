//! ServiceDesk data normalization and queue snapshots.
//!
//! Tickets arrive from the SD proxy as opaque JSON objects. The bridge only
//! interprets a handful of well-known fields (`Id`, `Name`, `Creator`) plus
//! whichever routing fields the runtime configuration binds by name, so the
//! ticket type is a thin accessor facade over the raw object rather than a
//! closed struct.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// One ticket from the SD open queue, kept as the raw JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ticket(pub serde_json::Map<String, serde_json::Value>);

impl Ticket {
    /// Ticket identity. `None` when `Id` is missing or not integer-coercible.
    pub fn id(&self) -> Option<i64> {
        to_int(self.0.get("Id"))
    }

    /// Ticket name, empty string when absent.
    pub fn name(&self) -> String {
        match self.0.get("Name") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => String::new(),
        }
    }

    /// Integer value of an arbitrary field, by name. Absent or
    /// non-integer-coercible values read as `None` and never match id rules.
    pub fn field_int(&self, field: &str) -> Option<i64> {
        if field.is_empty() {
            return None;
        }
        to_int(self.0.get(field))
    }

    /// String value of an arbitrary field, empty when absent.
    pub fn field_str(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) if !v.is_null() => v.to_string(),
            _ => String::new(),
        }
    }
}

/// Coerce a JSON value into an integer the way operators expect:
/// `101`, `"101"`, and `101.0` all read as `101`.
pub fn to_int(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                // Integral floats only; anything else is "unknown".
                n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)
            }
        }
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Normalize free text for keyword matching: trim + lowercase.
pub fn norm(s: &str) -> String {
    s.trim().to_lowercase()
}

/// A ticket reduced to the fields shown in chat messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTicket {
    pub id: i64,
    pub name: String,
    pub creator: String,
    pub url: String,
}

/// Normalize tickets for display: drop non-positive ids, sort by id, attach
/// the SD deep link.
pub fn normalize_for_message(items: &[Ticket], sd_base_url: &str) -> Vec<NormalizedTicket> {
    let base = sd_base_url.trim_end_matches('/');
    let mut normalized: Vec<NormalizedTicket> = items
        .iter()
        .filter_map(|t| {
            let id = t.id().filter(|id| *id > 0)?;
            Some(NormalizedTicket {
                id,
                name: t.name(),
                creator: t.field_str("Creator"),
                url: format!("{base}/task/view/{id}"),
            })
        })
        .collect();
    normalized.sort_by_key(|t| t.id);
    normalized
}

/// Snapshot of the queue composition, by id set only.
///
/// The digest is sha256 over the compact JSON array of the sorted, deduped
/// positive ids, so it is invariant under item order and ticket renames.
/// Returns the sorted ids alongside the digest for diagnostics.
pub fn ids_snapshot(items: &[Ticket]) -> (String, Vec<i64>) {
    let ids: BTreeSet<i64> = items
        .iter()
        .filter_map(|t| t.id())
        .filter(|id| *id > 0)
        .collect();
    let ids: Vec<i64> = ids.into_iter().collect();

    let mut payload = String::from("[");
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            payload.push(',');
        }
        payload.push_str(&id.to_string());
    }
    payload.push(']');

    use std::fmt::Write;
    let digest = Sha256::digest(payload.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in digest {
        let _ = write!(hex, "{b:02x}");
    }
    (hex, ids)
}

/// Build a ticket from raw JSON, for tests and fixtures.
pub fn ticket_from_value(v: serde_json::Value) -> Ticket {
    match v {
        serde_json::Value::Object(map) => Ticket(map),
        _ => Ticket(serde_json::Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ticket(v: serde_json::Value) -> Ticket {
        ticket_from_value(v)
    }

    #[test]
    fn to_int_accepts_int_string_and_integral_float() {
        assert_eq!(to_int(Some(&json!(101))), Some(101));
        assert_eq!(to_int(Some(&json!("101"))), Some(101));
        assert_eq!(to_int(Some(&json!(" 101 "))), Some(101));
        assert_eq!(to_int(Some(&json!(101.0))), Some(101));
        assert_eq!(to_int(Some(&json!(101.5))), None);
        assert_eq!(to_int(Some(&json!("x"))), None);
        assert_eq!(to_int(Some(&json!(null))), None);
        assert_eq!(to_int(None), None);
    }

    #[test]
    fn snapshot_ignores_order_and_names() {
        let a = vec![
            ticket(json!({"Id": 2, "Name": "B"})),
            ticket(json!({"Id": 1, "Name": "A"})),
        ];
        let b = vec![
            ticket(json!({"Id": 1, "Name": "A-renamed"})),
            ticket(json!({"Id": 2, "Name": "B"})),
        ];
        let (ha, ids_a) = ids_snapshot(&a);
        let (hb, ids_b) = ids_snapshot(&b);
        assert_eq!(ha, hb);
        assert_eq!(ids_a, vec![1, 2]);
        assert_eq!(ids_b, vec![1, 2]);
    }

    #[test]
    fn snapshot_changes_on_composition_change() {
        let a = vec![ticket(json!({"Id": 1})), ticket(json!({"Id": 2}))];
        let b = vec![
            ticket(json!({"Id": 1})),
            ticket(json!({"Id": 2})),
            ticket(json!({"Id": 3})),
        ];
        assert_ne!(ids_snapshot(&a).0, ids_snapshot(&b).0);
    }

    #[test]
    fn snapshot_skips_invalid_and_non_positive_ids() {
        let items = vec![
            ticket(json!({"Id": 0})),
            ticket(json!({"Id": -4})),
            ticket(json!({"Id": "nope"})),
            ticket(json!({"Name": "no id"})),
            ticket(json!({"Id": 7})),
        ];
        let (_, ids) = ids_snapshot(&items);
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn normalize_sorts_and_links() {
        let items = vec![
            ticket(json!({"Id": 9, "Name": "Nine", "Creator": "bob"})),
            ticket(json!({"Id": 3, "Name": "Three"})),
            ticket(json!({"Id": "x"})),
        ];
        let out = normalize_for_message(&items, "https://sd.example.com/");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, 3);
        assert_eq!(out[1].id, 9);
        assert_eq!(out[1].creator, "bob");
        assert_eq!(out[0].url, "https://sd.example.com/task/view/3");
    }
}
