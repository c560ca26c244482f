//! opsbridge - ServiceDesk open-queue notification bridge (bot binary).
//!
//! Polls the web service for the SD open queue, notifies chat destinations
//! on composition changes, escalates stale tickets, hot-reloads its runtime
//! configuration and watches its own infrastructure.
//!
//! # Usage
//!
//! ```bash
//! WEB_BASE_URL=http://web:8000 \
//! CHAT_BOT_TOKEN=123:abc \
//! ALERT_CHAT_ID=-100200300 \
//! cargo run --release --bin opsbridge
//! ```
//!
//! # Environment Variables
//!
//! - `WEB_BASE_URL`: base URL of the web service (default: http://web:8000)
//! - `CHAT_BOT_TOKEN`: chat bot token (required)
//! - `CHAT_API_BASE`: chat API base URL (default: https://api.telegram.org)
//! - `ALERT_CHAT_ID` / `ADMIN_ALERT_CHAT_ID`: alert destinations
//! - `POLL_INTERVAL_S` / `POLL_MAX_BACKOFF_S`: poller timings
//! - `CONFIG_ADMIN_TOKEN`: token for the rollback-stats probe
//! - `RUST_LOG`: logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use opsbridge::chat::{BotApiSender, ChatSender, DEFAULT_SEND_TIMEOUT_S};
use opsbridge::client::{SdWebClient, WebClient};
use opsbridge::env::{admin_alert_dest, env_f64, env_i64, env_u64, parse_dest_from_env, Environment};
use opsbridge::escalation::{EscalationManager, STATE_KEY};
use opsbridge::notify::NotificationService;
use opsbridge::observability::{ObservabilityConfig, ObservabilityService};
use opsbridge::poller::{OpenQueuePoller, PollerSettings};
use opsbridge::runtime::{sync::ConfigSync, ConfigHandle};
use opsbridge::state::{SledStore, StateStore};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "opsbridge")]
#[command(about = "ServiceDesk open-queue notification bridge")]
#[command(version)]
struct CliArgs {
    /// Directory for the bot's durable state (escalation tracking)
    #[arg(long, env = "OPSBRIDGE_STATE_DIR", default_value = "./data/state")]
    state_dir: PathBuf,

    /// Run without a durable state store (escalation one-shot guarantees
    /// then hold only within this process lifetime)
    #[arg(long)]
    no_state: bool,
}

// ============================================================================
// Configuration
// ============================================================================

/// Bot configuration from environment variables.
#[derive(Debug, Clone)]
struct BotSettings {
    web_base_url: String,
    chat_api_base: String,
    chat_bot_token: String,
    sd_base_url: String,
    poll_interval_s: f64,
    poll_max_backoff_s: f64,
    sd_timeout_s: f64,
    web_timeout_s: f64,
    web_cache_ttl_s: f64,
    config_admin_token: String,
    config_sync_interval_s: u64,
}

impl BotSettings {
    fn from_env() -> Result<Self> {
        let chat_bot_token = std::env::var("CHAT_BOT_TOKEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .context("CHAT_BOT_TOKEN environment variable is not set")?;

        Ok(Self {
            web_base_url: std::env::var("WEB_BASE_URL")
                .unwrap_or_else(|_| "http://web:8000".to_string()),
            chat_api_base: std::env::var("CHAT_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            chat_bot_token,
            sd_base_url: std::env::var("SERVICEDESK_BASE_URL").unwrap_or_default(),
            poll_interval_s: env_f64("POLL_INTERVAL_S", opsbridge::poller::DEFAULT_BASE_INTERVAL_S),
            poll_max_backoff_s: env_f64(
                "POLL_MAX_BACKOFF_S",
                opsbridge::poller::DEFAULT_MAX_BACKOFF_S,
            ),
            sd_timeout_s: env_f64("SD_WEB_TIMEOUT_S", opsbridge::client::sd::DEFAULT_TIMEOUT_S),
            web_timeout_s: env_f64("WEB_TIMEOUT_S", opsbridge::client::web::DEFAULT_TIMEOUT_S),
            web_cache_ttl_s: env_f64(
                "WEB_CACHE_TTL_S",
                opsbridge::client::web::DEFAULT_CACHE_TTL_S,
            ),
            config_admin_token: std::env::var("CONFIG_ADMIN_TOKEN").unwrap_or_default(),
            config_sync_interval_s: env_u64(
                "CONFIG_SYNC_INTERVAL_S",
                opsbridge::runtime::sync::DEFAULT_INTERVAL_S,
            ),
        })
    }
}

fn observability_settings() -> ObservabilityConfig {
    let defaults = ObservabilityConfig::default();
    ObservabilityConfig {
        admin_alert_min_interval_s: env_f64(
            "ADMIN_ALERT_MIN_INTERVAL_S",
            defaults.admin_alert_min_interval_s,
        ),
        web_alert_min_interval_s: env_f64(
            "WEB_ALERT_MIN_INTERVAL_S",
            defaults.web_alert_min_interval_s,
        ),
        state_alert_min_interval_s: env_f64(
            "STATE_ALERT_MIN_INTERVAL_S",
            defaults.state_alert_min_interval_s,
        ),
        rollback_alert_min_interval_s: env_f64(
            "ROLLBACK_ALERT_MIN_INTERVAL_S",
            defaults.rollback_alert_min_interval_s,
        ),
        probe_interval_s: env_u64("OBSERVABILITY_PROBE_INTERVAL_S", defaults.probe_interval_s),
        rollback_window_s: env_i64("ROLLBACK_ALERT_WINDOW_S", defaults.rollback_window_s),
        rollback_threshold: env_i64("ROLLBACK_ALERT_THRESHOLD", defaults.rollback_threshold),
    }
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let settings = BotSettings::from_env()?;
    let environment = Environment::from_env();

    info!(
        environment = %environment,
        web_base_url = %settings.web_base_url,
        "Starting opsbridge"
    );

    // Durable state store. A broken store degrades the bot (escalation
    // one-shot guarantees shrink to process lifetime), it does not kill it.
    let state_store: Option<Arc<dyn StateStore>> = if args.no_state {
        info!("State store disabled by --no-state");
        None
    } else {
        match SledStore::open(&args.state_dir) {
            Ok(store) => {
                info!(path = %args.state_dir.display(), "State store opened");
                Some(Arc::new(store))
            }
            Err(e) => {
                warn!(error = %e, path = %args.state_dir.display(),
                    "State store unavailable, continuing without persistence");
                None
            }
        }
    };

    // Runtime config plane.
    let config = ConfigHandle::new_empty();
    let config_sync = Arc::new(ConfigSync::new(
        &settings.web_base_url,
        config.clone(),
        settings.web_timeout_s.max(settings.sd_timeout_s),
        opsbridge::runtime::sync::DEFAULT_REFRESH_TTL_S,
    ));
    // First pull before the loops start; a cold-start failure leaves the
    // empty config, which routes nothing and alerts the admins per ticket.
    config_sync.pull().await;

    // Transports.
    let chat: Arc<dyn ChatSender> = Arc::new(BotApiSender::new(
        &settings.chat_api_base,
        &settings.chat_bot_token,
        DEFAULT_SEND_TIMEOUT_S,
    ));
    let web_client = Arc::new(WebClient::new(
        &settings.web_base_url,
        settings.web_timeout_s,
        settings.web_cache_ttl_s,
    ));
    let sd_client = SdWebClient::new(&settings.web_base_url, settings.sd_timeout_s);

    // Admin alerting and probes.
    let admin_dest = admin_alert_dest();
    if admin_dest.is_none() {
        warn!("ADMIN_ALERT_CHAT_ID/ALERT_CHAT_ID not set; admin alerts will only be logged");
    }
    let observability = Arc::new(ObservabilityService::new(
        chat.clone(),
        config.clone(),
        web_client.clone(),
        state_store.clone(),
        admin_dest,
        settings.config_admin_token.clone(),
        observability_settings(),
    ));

    // Fan-out and the poller.
    let notifier = Arc::new(NotificationService::new(
        chat.clone(),
        config.clone(),
        Some(config_sync.clone()),
        observability.clone(),
    ));
    let escalation = EscalationManager::new(state_store.clone(), STATE_KEY);
    let poller = OpenQueuePoller::new(
        sd_client,
        notifier.clone(),
        escalation,
        config.clone(),
        PollerSettings {
            base_interval_s: settings.poll_interval_s,
            max_backoff_s: settings.poll_max_backoff_s,
            fetch_limit: opsbridge::poller::DEFAULT_FETCH_LIMIT,
            sd_base_url: settings.sd_base_url.clone(),
        },
    );

    if parse_dest_from_env("ALERT").is_none() {
        info!("No ALERT_CHAT_ID; queue notifications rely entirely on the routing config");
    }

    // Spawn the loops; one token stops them all.
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    {
        let cancel = cancel.clone();
        tasks.spawn(async move { poller.run(cancel).await });
    }
    {
        let sync = config_sync.clone();
        let cancel = cancel.clone();
        let interval = settings.config_sync_interval_s;
        tasks.spawn(async move { sync.run(interval, 5, cancel).await });
    }
    {
        let obs = observability.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { obs.run(cancel).await });
    }

    info!("opsbridge started; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received, stopping loops");
    cancel.cancel();
    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "task ended abnormally during shutdown");
        }
    }

    info!("opsbridge stopped");
    Ok(())
}
