//! Recursive JSON diff used to label config history rows.

use serde_json::Value;

/// One changed path with its before/after values.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Change {
    pub path: String,
    pub from: Value,
    pub to: Value,
}

/// Diff two JSON documents. Objects recurse key by key (union of keys,
/// sorted); lists and scalars compare as a whole.
pub fn diff_values(a: &Value, b: &Value) -> Vec<Change> {
    let mut changes = Vec::new();
    diff_inner(a, b, "", &mut changes);
    changes
}

fn diff_inner(a: &Value, b: &Value, path: &str, out: &mut Vec<Change>) {
    match (a, b) {
        (Value::Object(ao), Value::Object(bo)) => {
            let mut keys: Vec<&String> = ao.keys().chain(bo.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                let av = ao.get(key).unwrap_or(&Value::Null);
                let bv = bo.get(key).unwrap_or(&Value::Null);
                diff_inner(av, bv, &new_path, out);
            }
        }
        _ => {
            if a != b {
                out.push(Change {
                    path: path.to_string(),
                    from: a.clone(),
                    to: b.clone(),
                });
            }
        }
    }
}

/// Short human-readable label for a history row: change count plus the first
/// few paths.
pub fn summarize(changes: &[Change]) -> String {
    if changes.is_empty() {
        return "no changes".to_string();
    }
    let shown: Vec<&str> = changes.iter().take(5).map(|c| c.path.as_str()).collect();
    let suffix = if changes.len() > shown.len() { ", ..." } else { "" };
    format!("{} change(s): {}{}", changes.len(), shown.join(", "), suffix)
}
