//! Postgres store for eventlog filters.

use sqlx::PgPool;

use super::{EventlogFilter, MatchKind};

#[derive(Clone)]
pub struct EventlogFilterStore {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct FilterRow {
    id: i64,
    field: String,
    pattern: String,
    match_kind: String,
    enabled: bool,
    hits: i64,
}

impl From<FilterRow> for EventlogFilter {
    fn from(row: FilterRow) -> Self {
        EventlogFilter {
            id: row.id,
            field: row.field,
            pattern: row.pattern,
            match_kind: MatchKind::parse(&row.match_kind),
            enabled: row.enabled,
            hits: row.hits,
        }
    }
}

impl EventlogFilterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enabled filters in id order.
    pub async fn list_enabled(&self) -> Result<Vec<EventlogFilter>, sqlx::Error> {
        let rows: Vec<FilterRow> = sqlx::query_as(
            "SELECT id, field, pattern, match_kind, enabled, hits
             FROM eventlog_filters WHERE enabled = TRUE ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EventlogFilter::from).collect())
    }

    /// Bump hit counters for the filters that fired.
    pub async fn increment_hits(&self, filter_ids: &[i64]) -> Result<(), sqlx::Error> {
        if filter_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE eventlog_filters SET hits = hits + 1, updated_at = now()
             WHERE id = ANY($1)",
        )
        .bind(filter_ids)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
