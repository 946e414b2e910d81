//! Postgres-backed [`Store`] implementation.
//!
//! Each submodule owns the SQL for one table; `PgStore` stitches them into
//! the capability traits the rest of the server consumes.

pub mod insights;
pub mod ops_events;
pub mod readings;

use crate::store::{RangeStore, Store, StoreError};
use aeris_protocol::{InsightsSnapshot, OpsEvent, OpsEventKind, SensorReading};
use async_trait::async_trait;
use sqlx::PgPool;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn add(&self, reading: &SensorReading) -> Result<(), StoreError> {
        readings::insert(&self.pool, reading).await?;
        Ok(())
    }

    async fn add_batch(&self, batch: &[SensorReading]) -> Result<(), StoreError> {
        readings::insert_batch(&self.pool, batch).await?;
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError> {
        Ok(readings::fetch_latest(&self.pool, limit).await?)
    }

    async fn delete_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64, StoreError> {
        Ok(readings::delete_older_than(&self.pool, cutoff, batch_limit).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn save_insights_snapshot(&self, snapshot: &InsightsSnapshot) -> Result<(), StoreError> {
        insights::upsert_snapshot(&self.pool, snapshot).await?;
        Ok(())
    }

    async fn latest_insights_snapshot(&self) -> Result<Option<InsightsSnapshot>, StoreError> {
        Ok(insights::fetch_snapshot(&self.pool).await?)
    }

    async fn add_ops_event(
        &self,
        timestamp: i64,
        kind: OpsEventKind,
        title: &str,
        detail: &str,
    ) -> Result<i64, StoreError> {
        Ok(ops_events::insert(&self.pool, timestamp, kind, title, detail).await?)
    }

    async fn latest_ops_events(&self, limit: usize) -> Result<Vec<OpsEvent>, StoreError> {
        Ok(ops_events::fetch_latest(&self.pool, limit).await?)
    }

    fn range_capability(&self) -> Option<&dyn RangeStore> {
        Some(self)
    }
}

#[async_trait]
impl RangeStore for PgStore {
    async fn range(
        &self,
        from: i64,
        to: i64,
        max_points: usize,
    ) -> Result<Vec<SensorReading>, StoreError> {
        Ok(readings::fetch_range(&self.pool, from, to, max_points).await?)
    }
}
