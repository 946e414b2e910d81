//! SQL for the `insights_snapshots` singleton row.
//!
//! The alert list is stored as JSONB text; the remaining snapshot fields are
//! flat columns so the dashboard can be served without touching the JSON.

use aeris_protocol::{Alert, InsightsSnapshot, Trigger};
use sqlx::{PgPool, Row};

const SNAPSHOT_KEY: &str = "latest";

pub async fn upsert_snapshot(pool: &PgPool, snapshot: &InsightsSnapshot) -> Result<(), sqlx::Error> {
    let insights_json = serde_json::to_string(&snapshot.insights)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"INSERT INTO insights_snapshots
               (snapshot_key, insights, source, generated_at, analyzed_samples, analysis_limit, "trigger", updated_at)
           VALUES ($1, $2::jsonb, $3, $4, $5, $6, $7, now())
           ON CONFLICT (snapshot_key) DO UPDATE SET
               insights = EXCLUDED.insights,
               source = EXCLUDED.source,
               generated_at = EXCLUDED.generated_at,
               analyzed_samples = EXCLUDED.analyzed_samples,
               analysis_limit = EXCLUDED.analysis_limit,
               "trigger" = EXCLUDED."trigger",
               updated_at = now()"#,
    )
    .bind(SNAPSHOT_KEY)
    .bind(&insights_json)
    .bind(&snapshot.source)
    .bind(snapshot.generated_at)
    .bind(snapshot.analyzed_samples)
    .bind(snapshot.analysis_limit)
    .bind(snapshot.trigger.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_snapshot(pool: &PgPool) -> Result<Option<InsightsSnapshot>, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT insights::text AS insights, source, generated_at,
                  analyzed_samples, analysis_limit, "trigger"
           FROM insights_snapshots
           WHERE snapshot_key = $1"#,
    )
    .bind(SNAPSHOT_KEY)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let insights_json: String = row.get("insights");
    let insights: Vec<Alert> = serde_json::from_str(&insights_json).unwrap_or_default();
    let trigger_text: String = row.get("trigger");
    let trigger = Trigger::parse(&trigger_text).unwrap_or(Trigger::Startup);

    Ok(Some(InsightsSnapshot {
        insights,
        source: row.get("source"),
        generated_at: row.get("generated_at"),
        analyzed_samples: row.get("analyzed_samples"),
        analysis_limit: row.get("analysis_limit"),
        trigger,
    }))
}
