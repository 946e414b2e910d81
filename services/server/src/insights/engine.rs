//! The insights engine: owns the latest snapshot and serializes recomputes.
//!
//! Recomputation follows a three-state machine guarded by one mutex:
//! idle, running, and running-with-pending.  Any number of triggers that
//! arrive during a recompute collapse into exactly one follow-up run (with
//! trigger `pending`), so the analyzer is never called concurrently and a
//! burst of qualifying readings costs at most one extra call.

use crate::config::InsightsConfig;
use crate::insights::analyzer::AlertAnalyzer;
use crate::store::Store;
use aeris_protocol::{InsightsSnapshot, SensorReading, Trigger, normalize_alerts};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PERSIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Cheap-to-clone handle; all clones share one snapshot and scheduler state.
#[derive(Clone)]
pub struct InsightsEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn Store>,
    analyzer: Arc<dyn AlertAnalyzer>,
    cfg: InsightsConfig,
    state: Mutex<EngineState>,
}

struct EngineState {
    snapshot: Option<InsightsSnapshot>,
    running: bool,
    pending: bool,
    last_reading: Option<SensorReading>,
    last_event_at: Option<Instant>,
}

impl InsightsEngine {
    pub fn new(
        store: Arc<dyn Store>,
        analyzer: Arc<dyn AlertAnalyzer>,
        cfg: InsightsConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                analyzer,
                cfg,
                state: Mutex::new(EngineState {
                    snapshot: None,
                    running: false,
                    pending: false,
                    last_reading: None,
                    last_event_at: None,
                }),
            }),
        }
    }

    /// The current snapshot with its alert list truncated to `limit`, or
    /// `None` before the first successful recompute.
    pub fn snapshot(&self, limit: usize) -> Option<InsightsSnapshot> {
        let state = self.inner.state.lock().expect("engine lock poisoned");
        state.snapshot.as_ref().map(|snap| {
            let mut copy = snap.clone();
            copy.insights.truncate(limit);
            copy
        })
    }

    /// Restore any persisted snapshot, kick off the startup recompute, and
    /// spawn the interval scheduler.
    pub async fn start(&self, shutdown: CancellationToken) {
        match self.inner.store.latest_insights_snapshot().await {
            Ok(Some(snapshot)) => {
                info!(
                    generated_at = snapshot.generated_at,
                    "restored persisted insights snapshot"
                );
                self.inner.state.lock().expect("engine lock poisoned").snapshot = Some(snapshot);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not restore insights snapshot"),
        }

        request_recompute(&self.inner, Trigger::Startup);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.cfg.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => request_recompute(&inner, Trigger::Interval),
                }
            }
        });
    }

    pub fn on_reading(&self, reading: &SensorReading) {
        if self.inner.observe(reading) {
            request_recompute(&self.inner, Trigger::Event);
        }
    }

    /// A batch triggers at most one recompute no matter how many readings in
    /// it qualify.
    pub fn on_batch(&self, readings: &[SensorReading]) {
        let mut fire = false;
        for reading in readings {
            fire |= self.inner.observe(reading);
        }
        if fire {
            request_recompute(&self.inner, Trigger::Event);
        }
    }

    pub fn request_recompute(&self, trigger: Trigger) {
        request_recompute(&self.inner, trigger);
    }
}

/// Enter the recompute state machine: start a run if idle, otherwise mark one
/// follow-up as pending.
fn request_recompute(inner: &Arc<EngineInner>, trigger: Trigger) {
    {
        let mut state = inner.state.lock().expect("engine lock poisoned");
        if state.running {
            state.pending = true;
            return;
        }
        state.running = true;
    }

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let mut trigger = trigger;
        loop {
            inner.recompute_once(trigger).await;
            let follow_up = {
                let mut state = inner.state.lock().expect("engine lock poisoned");
                if state.pending {
                    state.pending = false;
                    true
                } else {
                    state.running = false;
                    false
                }
            };
            if !follow_up {
                break;
            }
            trigger = Trigger::Pending;
        }
    });
}

impl EngineInner {
    /// Update event-trigger state with one reading; returns whether a
    /// recompute should fire.  The first reading only seeds the comparison
    /// state.
    fn observe(&self, reading: &SensorReading) -> bool {
        let mut state = self.state.lock().expect("engine lock poisoned");
        let Some(prev) = state.last_reading.replace(reading.clone()) else {
            return false;
        };

        let crossed_pm2 = prev.pm2 < self.cfg.pm2_trigger && reading.pm2 >= self.cfg.pm2_trigger;
        let crossed_pm10 =
            prev.pm10 < self.cfg.pm10_trigger && reading.pm10 >= self.cfg.pm10_trigger;
        let jumped_pm2 = (reading.pm2 - prev.pm2).abs() >= self.cfg.pm2_delta_trigger;
        let jumped_pm10 = (reading.pm10 - prev.pm10).abs() >= self.cfg.pm10_delta_trigger;
        if !(crossed_pm2 || crossed_pm10 || jumped_pm2 || jumped_pm10) {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = state.last_event_at {
            if now.duration_since(last) < self.cfg.event_min_interval {
                debug!("event trigger throttled");
                return false;
            }
        }
        state.last_event_at = Some(now);
        true
    }

    async fn recompute_once(&self, trigger: Trigger) {
        let analysis_limit = self.cfg.analysis_limit;
        let outcome = tokio::time::timeout(self.cfg.analyze_timeout, async {
            let readings = self
                .store
                .latest(analysis_limit)
                .await
                .map_err(|e| format!("reading window: {e}"))?;
            let alerts = self
                .analyzer
                .analyze(&readings)
                .await
                .map_err(|e| format!("analyze: {e}"))?;
            Ok::<_, String>((readings.len(), alerts))
        })
        .await;

        let (analyzed_samples, alerts) = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(?trigger, error = %e, "insights recompute failed, keeping previous snapshot");
                return;
            }
            Err(_) => {
                warn!(?trigger, timeout = ?self.cfg.analyze_timeout, "insights recompute timed out");
                return;
            }
        };

        let snapshot = InsightsSnapshot {
            insights: normalize_alerts(alerts, self.cfg.max_insights),
            source: self.analyzer.source().to_owned(),
            generated_at: chrono::Utc::now().timestamp_millis(),
            analyzed_samples: analyzed_samples as i64,
            analysis_limit: analysis_limit as i64,
            trigger,
        };

        info!(
            ?trigger,
            analyzed_samples,
            insights = snapshot.insights.len(),
            "insights snapshot updated"
        );
        self.state.lock().expect("engine lock poisoned").snapshot = Some(snapshot.clone());

        // Persistence is best-effort; the in-memory snapshot stands either way.
        match tokio::time::timeout(PERSIST_TIMEOUT, self.store.save_insights_snapshot(&snapshot))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to persist insights snapshot"),
            Err(_) => warn!("insights snapshot persistence timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{MemStore, MockAnalyzer};
    use aeris_protocol::Alert;
    use aeris_test_utils::reading;
    use std::sync::atomic::Ordering;

    fn cfg() -> InsightsConfig {
        InsightsConfig {
            max_insights: 3,
            analysis_limit: 30,
            refresh_interval: Duration::from_secs(3600),
            event_min_interval: Duration::ZERO,
            pm2_trigger: 8.0,
            pm10_trigger: 30.0,
            pm2_delta_trigger: 5.0,
            pm10_delta_trigger: 15.0,
            analyze_timeout: Duration::from_secs(5),
        }
    }

    fn alert(title: &str) -> Alert {
        Alert {
            kind: "insight".to_owned(),
            severity: "info".to_owned(),
            title: title.to_owned(),
            message: "details".to_owned(),
        }
    }

    fn reading_with_pm(ts: i64, pm2: f64, pm10: f64) -> SensorReading {
        let mut r = reading(ts);
        r.pm2 = pm2;
        r.pm10 = pm10;
        r
    }

    async fn wait_for_snapshot(engine: &InsightsEngine) -> InsightsSnapshot {
        for _ in 0..100 {
            if let Some(snap) = engine.snapshot(3) {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no snapshot appeared");
    }

    async fn wait_for_idle(engine: &InsightsEngine) {
        for _ in 0..100 {
            {
                let state = engine.inner.state.lock().unwrap();
                if !state.running && !state.pending {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never went idle");
    }

    #[tokio::test]
    async fn recompute_builds_and_persists_snapshot() {
        let store = MemStore::shared();
        store.add(&reading(1)).await.unwrap();
        let analyzer = MockAnalyzer::shared(vec![alert("a"), alert("b")]);
        let engine = InsightsEngine::new(store.clone(), analyzer, cfg());

        engine.request_recompute(Trigger::Startup);
        let snap = wait_for_snapshot(&engine).await;
        assert_eq!(snap.insights.len(), 2);
        assert_eq!(snap.source, "mock");
        assert_eq!(snap.trigger, Trigger::Startup);
        assert_eq!(snap.analyzed_samples, 1);

        wait_for_idle(&engine).await;
        let persisted = store.latest_insights_snapshot().await.unwrap().unwrap();
        assert_eq!(persisted.insights, snap.insights);
    }

    #[tokio::test]
    async fn concurrent_triggers_coalesce_to_one_follow_up() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::gated(vec![alert("a")]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.request_recompute(Trigger::Startup);
        analyzer.wait_for_calls(1).await;

        // Five triggers land while the first recompute is blocked inside the
        // analyzer; they must collapse into exactly one follow-up.
        for _ in 0..5 {
            engine.request_recompute(Trigger::Interval);
        }
        analyzer.release(2);
        wait_for_idle(&engine).await;

        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(engine.snapshot(3).unwrap().trigger, Trigger::Pending);
    }

    #[tokio::test]
    async fn analyzer_error_keeps_previous_snapshot() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![alert("first")]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.request_recompute(Trigger::Startup);
        let before = wait_for_snapshot(&engine).await;
        wait_for_idle(&engine).await;

        analyzer.fail_next.store(true, Ordering::SeqCst);
        engine.request_recompute(Trigger::Interval);
        wait_for_idle(&engine).await;

        let after = engine.snapshot(3).unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn alert_cap_applies_regardless_of_analyzer_output() {
        let store = MemStore::shared();
        let alerts: Vec<Alert> = (0..7).map(|i| alert(&format!("a{i}"))).collect();
        let analyzer = MockAnalyzer::shared(alerts);
        let engine = InsightsEngine::new(store, analyzer, cfg());

        engine.request_recompute(Trigger::Startup);
        let snap = wait_for_snapshot(&engine).await;
        assert_eq!(snap.insights.len(), 3);
        assert_eq!(engine.snapshot(1).unwrap().insights.len(), 1);
    }

    #[tokio::test]
    async fn first_reading_seeds_without_triggering() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.on_reading(&reading_with_pm(1, 50.0, 100.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upward_crossing_triggers_event_recompute() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![alert("pm2")]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.on_reading(&reading_with_pm(1, 2.0, 5.0));
        engine.on_reading(&reading_with_pm(2, 9.0, 5.0)); // crosses pm2_trigger = 8
        wait_for_idle(&engine).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.snapshot(3).unwrap().trigger, Trigger::Event);
    }

    #[tokio::test]
    async fn downward_move_does_not_trigger_crossing() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.on_reading(&reading_with_pm(1, 9.0, 5.0));
        engine.on_reading(&reading_with_pm(2, 8.5, 5.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn delta_trigger_fires_in_both_directions() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.on_reading(&reading_with_pm(1, 2.0, 40.0));
        engine.on_reading(&reading_with_pm(2, 2.0, 20.0)); // |Δpm10| = 20 >= 15
        wait_for_idle(&engine).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn event_throttle_swallows_rapid_triggers() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![]);
        let mut config = cfg();
        config.event_min_interval = Duration::from_secs(600);
        let engine = InsightsEngine::new(store, analyzer.clone(), config);

        engine.on_reading(&reading_with_pm(1, 2.0, 5.0));
        engine.on_reading(&reading_with_pm(2, 9.0, 5.0));
        engine.on_reading(&reading_with_pm(3, 2.0, 5.0));
        engine.on_reading(&reading_with_pm(4, 9.0, 5.0)); // throttled
        wait_for_idle(&engine).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_fires_at_most_once() {
        let store = MemStore::shared();
        let analyzer = MockAnalyzer::shared(vec![]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());

        engine.on_reading(&reading_with_pm(1, 2.0, 5.0));
        let batch = vec![
            reading_with_pm(2, 9.0, 5.0),
            reading_with_pm(3, 2.0, 5.0),
            reading_with_pm(4, 9.0, 5.0),
        ];
        engine.on_batch(&batch);
        wait_for_idle(&engine).await;
        assert_eq!(analyzer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_restores_persisted_snapshot() {
        let store = MemStore::shared();
        let persisted = InsightsSnapshot {
            insights: vec![alert("old")],
            source: "mock".to_owned(),
            generated_at: 123,
            analyzed_samples: 10,
            analysis_limit: 30,
            trigger: Trigger::Interval,
        };
        store.save_insights_snapshot(&persisted).await.unwrap();

        let analyzer = MockAnalyzer::gated(vec![alert("new")]);
        let engine = InsightsEngine::new(store, analyzer.clone(), cfg());
        let shutdown = CancellationToken::new();
        engine.start(shutdown.clone()).await;

        // Startup recompute is still blocked in the analyzer, so the restored
        // snapshot is what readers see.
        analyzer.wait_for_calls(1).await;
        assert_eq!(engine.snapshot(3).unwrap().generated_at, 123);

        analyzer.release(1);
        wait_for_idle(&engine).await;
        assert_eq!(engine.snapshot(3).unwrap().insights[0].title, "new");
        shutdown.cancel();
    }
}
