//! StateStore: typed key→JSON persistence for the bot.
//!
//! Abstracts the bot's durable state (escalation tracking, optional poller
//! snapshot) so backends can be swapped without touching engine code:
//! - `SledStore`: embedded on-disk store, the production default
//! - `MemoryStore`: in-memory store for tests and minimal deployments
//!
//! The contract is per-key last-writer-wins; nothing assumes atomicity
//! across keys. `last_ok_ts` feeds the degradation alert so operators can
//! see how stale the state may be.

mod sled_store;

pub use sled_store::SledStore;

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Key→JSON persistence with a health probe.
///
/// Implementations must be thread-safe (Send + Sync); the escalation engine
/// calls them from the poller task while observability pings from its own.
pub trait StateStore: Send + Sync {
    /// Read a JSON value, `None` when the key has never been written.
    fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, StateStoreError>;

    /// Write a JSON value (last writer wins).
    fn set_json(&self, key: &str, value: &serde_json::Value) -> Result<(), StateStoreError>;

    /// Cheap liveness probe; errors when the backend is unreachable.
    fn ping(&self) -> Result<(), StateStoreError>;

    /// Wall clock (unix seconds) of the most recent successful read/write.
    fn last_ok_ts(&self) -> Option<f64>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

pub(crate) fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// In-memory store for tests and minimal deployments. Not durable.
pub struct MemoryStore {
    map: RwLock<HashMap<String, serde_json::Value>>,
    last_ok: Mutex<Option<f64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            last_ok: Mutex::new(None),
        }
    }

    fn mark_ok(&self) {
        if let Ok(mut guard) = self.last_ok.lock() {
            *guard = Some(unix_now());
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>, StateStoreError> {
        let map = self
            .map
            .read()
            .map_err(|e| StateStoreError::Storage(e.to_string()))?;
        let value = map.get(key).cloned();
        drop(map);
        self.mark_ok();
        Ok(value)
    }

    fn set_json(&self, key: &str, value: &serde_json::Value) -> Result<(), StateStoreError> {
        let mut map = self
            .map
            .write()
            .map_err(|e| StateStoreError::Storage(e.to_string()))?;
        map.insert(key.to_string(), value.clone());
        drop(map);
        self.mark_ok();
        Ok(())
    }

    fn ping(&self) -> Result<(), StateStoreError> {
        self.mark_ok();
        Ok(())
    }

    fn last_ok_ts(&self) -> Option<f64> {
        self.last_ok.lock().ok().and_then(|g| *g)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_json("k").unwrap().is_none());

        store.set_json("k", &json!({"a": 1})).unwrap();
        assert_eq!(store.get_json("k").unwrap(), Some(json!({"a": 1})));

        // Last writer wins.
        store.set_json("k", &json!({"a": 2})).unwrap();
        assert_eq!(store.get_json("k").unwrap(), Some(json!({"a": 2})));
    }

    #[test]
    fn memory_store_tracks_last_ok() {
        let store = MemoryStore::new();
        assert!(store.last_ok_ts().is_none());
        store.ping().unwrap();
        assert!(store.last_ok_ts().is_some());
    }

    #[test]
    fn trait_object_usable() {
        let store: Box<dyn StateStore> = Box::new(MemoryStore::new());
        store.set_json("x", &json!(42)).unwrap();
        assert_eq!(store.get_json("x").unwrap(), Some(json!(42)));
        assert_eq!(store.backend_name(), "memory");
    }
}
