//! Web service: versioned config API, SD open-queue proxy, health surface.
//!
//! ## Modules
//!
//! - `store`: Postgres-backed versioned config with history and rollback
//! - `diff`: JSON diff labelling history rows
//! - `auth`: admin bearer-token extractor
//! - `request_id`: X-Request-ID middleware
//! - `sd_proxy`: the single SD-facing HTTP client
//! - `handlers` / `routes`: HTTP surface wiring

pub mod auth;
pub mod diff;
pub mod handlers;
pub mod request_id;
pub mod routes;
pub mod sd_proxy;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use tracing::warn;

use crate::env::Environment;
use crate::eventlog::EventlogFilterStore;
use sd_proxy::SdProxy;
use store::ConfigStore;

/// Shared web application state.
pub struct WebState {
    pub store: ConfigStore,
    pub eventlog_filters: EventlogFilterStore,
    pub sd: SdProxy,
    pub admin_token: String,
    pub environment: Environment,
}

impl WebState {
    pub fn new(
        store: ConfigStore,
        eventlog_filters: EventlogFilterStore,
        sd: SdProxy,
        admin_token: String,
        environment: Environment,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            eventlog_filters,
            sd,
            admin_token,
            environment,
        })
    }
}

/// Web service configuration from environment variables.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub database_url: String,
    pub bind_address: String,
    pub admin_token: String,
    pub sd_base_url: String,
    pub sd_api_token: String,
    pub sd_timeout_s: f64,
    pub sd_cache_ttl_s: f64,
    /// Maximum request payload size in bytes.
    pub max_payload_size: usize,
}

impl WebSettings {
    /// Load from env with CLI overrides. `DATABASE_URL` is mandatory: a
    /// config service without its database is not worth starting.
    pub fn from_env(bind_address: Option<String>, port: Option<u16>) -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("DATABASE_URL environment variable is not set")?;

        let bind_address = bind_address.unwrap_or_else(|| {
            let port = port.unwrap_or(8000);
            format!("0.0.0.0:{port}")
        });

        let admin_token = std::env::var("CONFIG_ADMIN_TOKEN").unwrap_or_default();
        if admin_token.is_empty() {
            warn!("CONFIG_ADMIN_TOKEN not set; config write/history/rollback endpoints are disabled");
        }

        let sd_base_url = std::env::var("SERVICEDESK_BASE_URL").unwrap_or_default();
        let sd_api_token = std::env::var("SERVICEDESK_API_TOKEN").unwrap_or_default();
        if sd_base_url.is_empty() || sd_api_token.is_empty() {
            warn!("SERVICEDESK_BASE_URL/SERVICEDESK_API_TOKEN not set; /sd/open will fail until configured");
        }

        Ok(Self {
            database_url,
            bind_address,
            admin_token,
            sd_base_url,
            sd_api_token,
            sd_timeout_s: crate::env::env_f64("SD_WEB_TIMEOUT_S", sd_proxy::DEFAULT_TIMEOUT_S),
            sd_cache_ttl_s: crate::env::env_f64("WEB_CACHE_TTL_S", sd_proxy::DEFAULT_CACHE_TTL_S),
            max_payload_size: 1_048_576,
        })
    }
}
