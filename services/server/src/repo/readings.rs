//! SQL for the `sensor_readings` table.

use aeris_protocol::SensorReading;
use sqlx::{PgPool, Row};

const COLUMNS: &str =
    "timestamp, temperature, pressure, humidity, oxidised, reduced, nh3, pm1, pm2, pm10";

fn row_to_reading(row: &sqlx::postgres::PgRow) -> SensorReading {
    SensorReading {
        timestamp: row.get("timestamp"),
        temperature: row.get("temperature"),
        pressure: row.get("pressure"),
        humidity: row.get("humidity"),
        oxidised: row.get("oxidised"),
        reduced: row.get("reduced"),
        nh3: row.get("nh3"),
        pm1: row.get("pm1"),
        pm2: row.get("pm2"),
        pm10: row.get("pm10"),
    }
}

pub async fn insert(pool: &PgPool, r: &SensorReading) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO sensor_readings
               (timestamp, temperature, pressure, humidity, oxidised, reduced, nh3, pm1, pm2, pm10)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(r.timestamp)
    .bind(r.temperature)
    .bind(r.pressure)
    .bind(r.humidity)
    .bind(r.oxidised)
    .bind(r.reduced)
    .bind(r.nh3)
    .bind(r.pm1)
    .bind(r.pm2)
    .bind(r.pm10)
    .execute(pool)
    .await?;
    Ok(())
}

/// All-or-nothing batch insert.  Row order inside the transaction follows
/// slice order, so `id` order matches the order the device sent.
pub async fn insert_batch(pool: &PgPool, batch: &[SensorReading]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for r in batch {
        sqlx::query(
            r#"INSERT INTO sensor_readings
                   (timestamp, temperature, pressure, humidity, oxidised, reduced, nh3, pm1, pm2, pm10)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
        )
        .bind(r.timestamp)
        .bind(r.temperature)
        .bind(r.pressure)
        .bind(r.humidity)
        .bind(r.oxidised)
        .bind(r.reduced)
        .bind(r.nh3)
        .bind(r.pm1)
        .bind(r.pm2)
        .bind(r.pm10)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Most recently inserted readings, selected by `id DESC` and reversed so the
/// caller gets them oldest-first.
pub async fn fetch_latest(pool: &PgPool, limit: usize) -> Result<Vec<SensorReading>, sqlx::Error> {
    let rows = sqlx::query(sqlx::AssertSqlSafe(format!(
        "SELECT {COLUMNS} FROM sensor_readings ORDER BY id DESC LIMIT $1"
    )))
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    let mut readings: Vec<SensorReading> = rows.iter().map(row_to_reading).collect();
    readings.reverse();
    Ok(readings)
}

/// Readings in `[from, to)` ordered by timestamp ascending, subsampled to at
/// most `max_points` rows while always keeping the window endpoints.
pub async fn fetch_range(
    pool: &PgPool,
    from: i64,
    to: i64,
    max_points: usize,
) -> Result<Vec<SensorReading>, sqlx::Error> {
    let total: i64 =
        sqlx::query("SELECT count(*) AS n FROM sensor_readings WHERE timestamp >= $1 AND timestamp < $2")
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await?
            .get("n");

    if total == 0 || max_points == 0 {
        return Ok(Vec::new());
    }

    if total as usize <= max_points {
        let rows = sqlx::query(sqlx::AssertSqlSafe(format!(
            "SELECT {COLUMNS} FROM sensor_readings
             WHERE timestamp >= $1 AND timestamp < $2
             ORDER BY timestamp ASC, id ASC"
        )))
        .bind(from)
        .bind(to)
        .fetch_all(pool)
        .await?;
        return Ok(rows.iter().map(row_to_reading).collect());
    }

    // Keep every stride-th row plus the last; trim from the tail end if the
    // extra endpoint pushes the count past the cap.
    let stride = (total as usize).div_ceil(max_points) as i64;
    let rows = sqlx::query(sqlx::AssertSqlSafe(format!(
        "WITH windowed AS (
             SELECT {COLUMNS},
                    row_number() OVER (ORDER BY timestamp ASC, id ASC) AS rn,
                    count(*) OVER () AS total
             FROM sensor_readings
             WHERE timestamp >= $1 AND timestamp < $2
         )
         SELECT {COLUMNS} FROM windowed
         WHERE (rn - 1) % $3 = 0 OR rn = total
         ORDER BY rn"
    )))
    .bind(from)
    .bind(to)
    .bind(stride)
    .fetch_all(pool)
    .await?;

    let mut readings: Vec<SensorReading> = rows.iter().map(row_to_reading).collect();
    while readings.len() > max_points {
        let cut = readings.len() - 2;
        readings.remove(cut);
    }
    Ok(readings)
}

pub async fn delete_older_than(
    pool: &PgPool,
    cutoff: i64,
    batch_limit: u32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM sensor_readings
         WHERE id IN (
             SELECT id FROM sensor_readings
             WHERE timestamp < $1
             ORDER BY timestamp ASC
             LIMIT $2
         )",
    )
    .bind(cutoff)
    .bind(i64::from(batch_limit))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
