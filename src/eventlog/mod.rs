//! Eventlog filters: operator-maintained patterns that decide which SD
//! eventlog messages are worth forwarding.
//!
//! Matching supports two kinds, `contains` (default) and `regex`. An invalid
//! regex matches nothing rather than erroring, so one bad pattern cannot
//! take the filtering path down. The scraping of the eventlog itself lives
//! outside this crate; here we keep the filter model, the matcher, and the
//! Postgres store.

mod store;

pub use store::EventlogFilterStore;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// How a filter pattern is applied to the target text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    #[default]
    Contains,
    Regex,
}

impl MatchKind {
    /// Parse the stored kind; anything unknown degrades to `contains`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "regex" => MatchKind::Regex,
            _ => MatchKind::Contains,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Contains => "contains",
            MatchKind::Regex => "regex",
        }
    }
}

/// One eventlog filter row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventlogFilter {
    pub id: i64,
    pub field: String,
    pub pattern: String,
    pub match_kind: MatchKind,
    pub enabled: bool,
    pub hits: i64,
}

/// Resolve which part of the parsed eventlog message a filter looks at.
///
/// `any` (or `*`) concatenates every value; otherwise the field name is
/// looked up as given, then lowercased.
fn resolve_target(field: &str, message: &HashMap<String, String>) -> String {
    let trimmed = field.trim();
    let lowered = trimmed.to_lowercase();
    if lowered == "any" || trimmed == "*" {
        let mut values: Vec<&str> = message.values().map(String::as_str).collect();
        values.sort_unstable();
        return values.join(" ");
    }
    if let Some(v) = message.get(trimmed) {
        return v.clone();
    }
    message.get(&lowered).cloned().unwrap_or_default()
}

/// Whether a filter fires for the given eventlog message.
pub fn filter_matches(filter: &EventlogFilter, message: &HashMap<String, String>) -> bool {
    if filter.pattern.is_empty() {
        return false;
    }
    let target = resolve_target(&filter.field, message);
    match filter.match_kind {
        MatchKind::Contains => target.contains(&filter.pattern),
        MatchKind::Regex => match regex::Regex::new(&filter.pattern) {
            Ok(re) => re.is_match(&target),
            Err(_) => false,
        },
    }
}
