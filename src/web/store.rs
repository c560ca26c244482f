//! Postgres-backed versioned configuration store.
//!
//! One live row in `bot_config` plus an append-only `bot_config_history`.
//! Every write validates first, then in a single transaction: lock the live
//! row, append a history row carrying the *prior* body (keyed by the prior
//! version), bump the version by exactly one. Rollback is just another write
//! whose body comes from history, so the version keeps increasing and the
//! audit trail stays linear.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use super::diff::{diff_values, summarize};
use crate::runtime::validate::{validate_config, ConfigValidationError};

/// The body seeded on first startup: empty routing, escalation off.
pub const DEFAULT_CONFIG_JSON: &str =
    r#"{"routing":{"rules":[],"default_dest":{}},"escalation":{"enabled":false}}"#;

const ROLLBACK_LABEL_PREFIX: &str = "rollback to version ";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("config row missing")]
    RowMissing,
    #[error("stored config unparseable: {0}")]
    Corrupt(String),
    #[error("unknown version {0}")]
    UnknownVersion(i64),
    #[error(transparent)]
    Validation(#[from] ConfigValidationError),
}

/// One history entry, newest first in listings. `version` is the version the
/// write replaced; `prior_config_json` is that version's body.
#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct HistoryRow {
    pub version: i64,
    pub at: DateTime<Utc>,
    pub actor: String,
    pub change_summary: String,
    pub prior_config_json: String,
}

/// Rollback frequency within a sliding window.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RollbackStats {
    pub count: i64,
    pub last_rollback_at: Option<DateTime<Utc>>,
    pub window_s: i64,
}

/// Create the shared connection pool with pre-ping.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}

/// Run database migrations from the migrations/ directory.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Migrations complete");
    Ok(())
}

#[derive(Clone)]
pub struct ConfigStore {
    pool: PgPool,
}

impl ConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Seed the live row when it does not exist yet (fresh database).
    pub async fn ensure_seed(&self) -> Result<(), StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO bot_config (id, version, config_json) VALUES (1, 1, $1)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(DEFAULT_CONFIG_JSON)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            info!("Seeded initial bot config (version 1)");
        }
        Ok(())
    }

    async fn read_raw(&self) -> Result<(serde_json::Value, i64), StoreError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT version, config_json FROM bot_config WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        let (version, json) = row.ok_or(StoreError::RowMissing)?;
        let body: serde_json::Value =
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok((body, version))
    }

    /// Current config with `version` injected into the body.
    pub async fn read(&self) -> Result<(serde_json::Value, i64), StoreError> {
        let (mut body, version) = self.read_raw().await?;
        if let Some(obj) = body.as_object_mut() {
            obj.insert("version".to_string(), serde_json::json!(version));
        }
        Ok((body, version))
    }

    /// Validate and apply a new config. Returns the new version.
    ///
    /// `summary_label` overrides the diff-derived change summary (the
    /// rollback path uses it to label itself).
    pub async fn write(
        &self,
        new_config: &serde_json::Value,
        actor: &str,
        summary_label: Option<&str>,
    ) -> Result<i64, StoreError> {
        validate_config(new_config)?;

        // `version` in the body is server-owned; never store a stale copy.
        let mut body = new_config.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.remove("version");
        }
        let body_str =
            serde_json::to_string(&body).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT version, config_json FROM bot_config WHERE id = 1 FOR UPDATE")
                .fetch_optional(&mut *tx)
                .await?;
        let (prior_version, prior_json) = row.ok_or(StoreError::RowMissing)?;
        let new_version = prior_version + 1;

        let summary = match summary_label {
            Some(label) => label.to_string(),
            None => {
                let prior: serde_json::Value =
                    serde_json::from_str(&prior_json).unwrap_or(serde_json::Value::Null);
                summarize(&diff_values(&prior, &body))
            }
        };

        sqlx::query(
            "INSERT INTO bot_config_history (version, at, actor, change_summary, prior_config_json)
             VALUES ($1, now(), $2, $3, $4)",
        )
        .bind(prior_version)
        .bind(actor)
        .bind(&summary)
        .bind(&prior_json)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE bot_config SET version = $1, config_json = $2 WHERE id = 1")
            .bind(new_version)
            .bind(&body_str)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(version = new_version, actor, summary = %summary, "config written");
        Ok(new_version)
    }

    /// Write an earlier version's body as a new version.
    pub async fn rollback(&self, to_version: i64, actor: &str) -> Result<i64, StoreError> {
        let (current_body, current_version) = self.read_raw().await?;

        let body = if to_version == current_version {
            current_body
        } else {
            let json: Option<String> = sqlx::query_scalar(
                "SELECT prior_config_json FROM bot_config_history WHERE version = $1",
            )
            .bind(to_version)
            .fetch_optional(&self.pool)
            .await?;
            let json = json.ok_or(StoreError::UnknownVersion(to_version))?;
            serde_json::from_str(&json).map_err(|e| StoreError::Corrupt(e.to_string()))?
        };

        self.write(
            &body,
            actor,
            Some(&format!("{ROLLBACK_LABEL_PREFIX}{to_version}")),
        )
        .await
    }

    /// Most recent history rows, newest first.
    pub async fn history(&self, limit: i64) -> Result<Vec<HistoryRow>, StoreError> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT version, at, actor, change_summary, prior_config_json
             FROM bot_config_history ORDER BY version DESC LIMIT $1",
        )
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rollback-labelled writes within the window.
    pub async fn rollback_stats(&self, window_s: i64) -> Result<RollbackStats, StoreError> {
        let pattern = format!("{ROLLBACK_LABEL_PREFIX}%");
        let row: (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            "SELECT count(*), max(at) FROM bot_config_history
             WHERE change_summary LIKE $1
               AND at >= now() - make_interval(secs => $2)",
        )
        .bind(&pattern)
        .bind(window_s as f64)
        .fetch_one(&self.pool)
        .await?;

        Ok(RollbackStats {
            count: row.0,
            last_rollback_at: row.1,
            window_s,
        })
    }
}
