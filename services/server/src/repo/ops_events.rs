//! SQL for the append-only `ops_events` table.

use aeris_protocol::{OpsEvent, OpsEventKind};
use sqlx::{PgPool, Row};

pub async fn insert(
    pool: &PgPool,
    timestamp: i64,
    kind: OpsEventKind,
    title: &str,
    detail: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "INSERT INTO ops_events (timestamp, kind, title, detail)
         VALUES ($1, $2, $3, $4)
         RETURNING id",
    )
    .bind(timestamp)
    .bind(kind.as_str())
    .bind(title)
    .bind(detail)
    .fetch_one(pool)
    .await?;
    Ok(row.get("id"))
}

/// Latest events first, by store-assigned id.
pub async fn fetch_latest(pool: &PgPool, limit: usize) -> Result<Vec<OpsEvent>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, timestamp, kind, title, detail
         FROM ops_events
         ORDER BY id DESC
         LIMIT $1",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let kind: String = row.get("kind");
            // Rows with an unrecognized kind (written by a newer build) are skipped.
            OpsEventKind::parse(&kind).map(|kind| OpsEvent {
                id: row.get("id"),
                timestamp: row.get("timestamp"),
                kind,
                title: row.get("title"),
                detail: row.get("detail"),
            })
        })
        .collect())
}
