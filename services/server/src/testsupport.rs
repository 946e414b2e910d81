//! In-memory doubles for unit tests: a [`Store`] that keeps everything in
//! mutex-guarded vectors, and a scriptable [`AlertAnalyzer`].
//!
//! `MemStore` deliberately does not implement the range capability, which
//! also makes it the fixture for the 501 feature-detect path.

use crate::insights::analyzer::{AlertAnalyzer, AnalyzerError};
use crate::store::{Store, StoreError};
use aeris_protocol::{Alert, InsightsSnapshot, OpsEvent, OpsEventKind, SensorReading};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

#[derive(Default)]
pub struct MemStore {
    readings: Mutex<Vec<SensorReading>>,
    snapshot: Mutex<Option<InsightsSnapshot>>,
    ops: Mutex<Vec<OpsEvent>>,
    pub fail_ops: AtomicBool,
}

impl MemStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reading_count(&self) -> usize {
        self.readings.lock().unwrap().len()
    }

    pub fn ops_kinds(&self) -> Vec<OpsEventKind> {
        self.ops.lock().unwrap().iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn add(&self, reading: &SensorReading) -> Result<(), StoreError> {
        self.readings.lock().unwrap().push(reading.clone());
        Ok(())
    }

    async fn add_batch(&self, batch: &[SensorReading]) -> Result<(), StoreError> {
        self.readings.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<SensorReading>, StoreError> {
        let readings = self.readings.lock().unwrap();
        let start = readings.len().saturating_sub(limit);
        Ok(readings[start..].to_vec())
    }

    async fn delete_older_than(&self, cutoff: i64, batch_limit: u32) -> Result<u64, StoreError> {
        let mut readings = self.readings.lock().unwrap();
        let mut deleted = 0u64;
        readings.retain(|r| {
            if r.timestamp < cutoff && deleted < u64::from(batch_limit) {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn save_insights_snapshot(&self, snapshot: &InsightsSnapshot) -> Result<(), StoreError> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }

    async fn latest_insights_snapshot(&self) -> Result<Option<InsightsSnapshot>, StoreError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn add_ops_event(
        &self,
        timestamp: i64,
        kind: OpsEventKind,
        title: &str,
        detail: &str,
    ) -> Result<i64, StoreError> {
        if self.fail_ops.load(Ordering::SeqCst) {
            return Err(StoreError::Db(sqlx::Error::PoolClosed));
        }
        let mut ops = self.ops.lock().unwrap();
        let id = ops.len() as i64 + 1;
        ops.push(OpsEvent {
            id,
            timestamp,
            kind,
            title: title.to_owned(),
            detail: detail.to_owned(),
        });
        Ok(id)
    }

    async fn latest_ops_events(&self, limit: usize) -> Result<Vec<OpsEvent>, StoreError> {
        let ops = self.ops.lock().unwrap();
        Ok(ops.iter().rev().take(limit).cloned().collect())
    }
}

pub struct MockAnalyzer {
    alerts: Mutex<Vec<Alert>>,
    pub calls: AtomicUsize,
    pub fail_next: AtomicBool,
    gate: Option<Semaphore>,
}

impl MockAnalyzer {
    /// Analyzer that answers immediately with `alerts`.
    pub fn shared(alerts: Vec<Alert>) -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(alerts),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            gate: None,
        })
    }

    /// Analyzer that blocks inside `analyze` until [`Self::release`] grants a
    /// permit -- used to hold a recompute in flight.
    pub fn gated(alerts: Vec<Alert>) -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(alerts),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            gate: Some(Semaphore::new(0)),
        })
    }

    pub fn release(&self, n: usize) {
        self.gate.as_ref().expect("not a gated analyzer").add_permits(n);
    }

    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..200 {
            if self.calls.load(Ordering::SeqCst) >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("analyzer never reached {n} calls");
    }
}

#[async_trait]
impl AlertAnalyzer for MockAnalyzer {
    async fn analyze(&self, _readings: &[SensorReading]) -> Result<Vec<Alert>, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AnalyzerError::Parse("induced failure".to_owned()));
        }
        Ok(self.alerts.lock().unwrap().clone())
    }

    fn source(&self) -> &str {
        "mock"
    }
}
