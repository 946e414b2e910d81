//! Storage capabilities consumed by the HTTP surface and background loops.
//!
//! The store is the single owner of persisted state.  Handlers and workers
//! hold `Arc<dyn Store>`; the Postgres implementation lives in [`crate::repo`].
//! Range queries are a separate capability so handlers can feature-detect a
//! store that cannot serve them and answer 501 instead of guessing.

use aeris_protocol::{InsightsSnapshot, OpsEvent, OpsEventKind, SensorReading};
use async_trait::async_trait;

/// Default and ceiling bounds shared by the store and the HTTP layer.
pub const LATEST_DEFAULT_LIMIT: usize = 100;
pub const LATEST_MAX_LIMIT: usize = 100_000;
pub const OPS_DEFAULT_LIMIT: usize = 30;
pub const OPS_MAX_LIMIT: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Durable persistence for readings, the insights snapshot, and ops events.
#[async_trait]
pub trait Store: Send + Sync {
    async fn add(&self, reading: &SensorReading) -> Result<(), StoreError>;

    /// Insert all readings in one transaction; either every row commits or
    /// none do.  Insertion order follows slice order.
    async fn add_batch(&self, readings: &[SensorReading]) -> Result<(), StoreError>;

    /// Up to `limit` most recently inserted readings, returned oldest-first.
    async fn latest(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError>;

    /// Delete at most `batch_limit` readings with `timestamp < cutoff`,
    /// returning the number deleted.  Callers loop until this returns 0.
    async fn delete_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Upsert the singleton snapshot row.
    async fn save_insights_snapshot(&self, snapshot: &InsightsSnapshot) -> Result<(), StoreError>;

    /// The persisted snapshot, or `None` when no recompute has ever finished.
    async fn latest_insights_snapshot(&self) -> Result<Option<InsightsSnapshot>, StoreError>;

    /// Append an ops event, returning its store-assigned id.
    async fn add_ops_event(
        &self,
        timestamp: i64,
        kind: OpsEventKind,
        title: &str,
        detail: &str,
    ) -> Result<i64, StoreError>;

    /// Up to `limit` ops events, most recent first (by id).
    async fn latest_ops_events(&self, limit: usize) -> Result<Vec<OpsEvent>, StoreError>;

    /// Range queries are optional; stores that can serve them return `Some`.
    fn range_capability(&self) -> Option<&dyn RangeStore> {
        None
    }
}

/// Optional capability: time-windowed queries over `[from, to)`.
#[async_trait]
pub trait RangeStore: Send + Sync {
    /// At most `max_points` readings with `from <= timestamp < to`, ordered by
    /// timestamp ascending.  Implementations may subsample but must keep the
    /// window endpoints.
    async fn range(
        &self,
        from: i64,
        to: i64,
        max_points: usize,
    ) -> Result<Vec<SensorReading>, StoreError>;
}
