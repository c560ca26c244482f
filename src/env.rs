//! Environment-variable surface shared by both binaries.

use crate::routing::Destination;
use crate::sd::to_int;

/// Deployment environment label, used in logs and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Staging,
    Prod,
    Local,
}

impl Environment {
    /// Read `ENVIRONMENT`; unknown or missing values read as `Local`.
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").unwrap_or_default().trim() {
            "staging" => Environment::Staging,
            "prod" => Environment::Prod,
            _ => Environment::Local,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Staging => write!(f, "staging"),
            Environment::Prod => write!(f, "prod"),
            Environment::Local => write!(f, "local"),
        }
    }
}

/// Parse `{PREFIX}_CHAT_ID` / `{PREFIX}_THREAD_ID` into a destination.
/// A thread id of 0 normalizes to none, same as in the config JSON.
pub fn parse_dest_from_env(prefix: &str) -> Option<Destination> {
    let chat_id = std::env::var(format!("{prefix}_CHAT_ID")).ok()?;
    let chat_id = to_int(Some(&serde_json::Value::String(chat_id)))?;
    let thread_id = std::env::var(format!("{prefix}_THREAD_ID"))
        .ok()
        .and_then(|v| to_int(Some(&serde_json::Value::String(v))))
        .filter(|t| *t != 0);
    Some(Destination::new(chat_id, thread_id))
}

/// Admin alert destination: the dedicated admin chat when configured, the
/// general alert chat otherwise.
pub fn admin_alert_dest() -> Option<Destination> {
    parse_dest_from_env("ADMIN_ALERT").or_else(|| parse_dest_from_env("ALERT"))
}

/// Env vars the web service cannot work without.
pub const REQUIRED_WEB_ENVS: [&str; 3] = [
    "SERVICEDESK_BASE_URL",
    "SERVICEDESK_API_TOKEN",
    "DATABASE_URL",
];

/// Names from [`REQUIRED_WEB_ENVS`] that are missing or blank.
pub fn missing_required_envs() -> Vec<&'static str> {
    REQUIRED_WEB_ENVS
        .iter()
        .filter(|name| {
            std::env::var(name)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
        .copied()
        .collect()
}

/// `STRICT_READINESS=1` makes missing required envs fail `/ready` instead of
/// just warning.
pub fn strict_readiness() -> bool {
    std::env::var("STRICT_READINESS")
        .map(|v| v.trim() == "1")
        .unwrap_or(false)
}

/// Read an env var as f64, falling back to a default.
pub fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read an env var as u64, falling back to a default.
pub fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read an env var as i64, falling back to a default.
pub fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
