//! ops-web - web service binary.
//!
//! Serves the versioned runtime configuration (read, replace, history,
//! rollback), proxies the SD open queue for the bot, and exposes the
//! health/readiness surface.
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://ops:secret@db/opsbridge \
//! CONFIG_ADMIN_TOKEN=change-me \
//! SERVICEDESK_BASE_URL=https://sd.example.com \
//! SERVICEDESK_API_TOKEN=sd-token \
//! cargo run --release --bin ops-web -- --port 8000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use opsbridge::env::Environment;
use opsbridge::eventlog::EventlogFilterStore;
use opsbridge::web::routes::build_router;
use opsbridge::web::sd_proxy::SdProxy;
use opsbridge::web::store::{create_pool, run_migrations, ConfigStore};
use opsbridge::web::{WebSettings, WebState};

#[derive(Parser, Debug)]
#[command(name = "ops-web")]
#[command(about = "opsbridge web service: config API and SD proxy")]
#[command(version)]
struct CliArgs {
    /// Bind address (e.g. "0.0.0.0:8000"); overrides --port
    #[arg(long)]
    bind_address: Option<String>,

    /// Listen port (default: 8000)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let settings = WebSettings::from_env(args.bind_address, args.port)?;
    let environment = Environment::from_env();

    info!(environment = %environment, bind = %settings.bind_address, "Starting ops-web");

    let pool = create_pool(&settings.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;
    run_migrations(&pool)
        .await
        .context("failed to run migrations")?;

    let store = ConfigStore::new(pool.clone());
    store.ensure_seed().await.context("failed to seed config")?;

    let state = WebState::new(
        store,
        EventlogFilterStore::new(pool),
        SdProxy::new(
            &settings.sd_base_url,
            &settings.sd_api_token,
            settings.sd_timeout_s,
            settings.sd_cache_ttl_s,
        ),
        settings.admin_token.clone(),
        environment,
    );

    let app = build_router(state, settings.max_payload_size);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address))?;

    info!(bind = %settings.bind_address, "ops-web listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("server error")?;

    info!("ops-web stopped");
    Ok(())
}
