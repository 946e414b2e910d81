//! Device-liveness monitor.
//!
//! All device connectivity state lives here, behind one mutex; ingest
//! handlers and the timeout ticker both mutate it exclusively through this
//! type.  Transitions append ops events, persisted asynchronously so a slow
//! database write never sits on the ingest path.

use crate::config::OpsConfig;
use crate::store::Store;
use aeris_protocol::OpsEventKind;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PERSIST_TIMEOUT: Duration = Duration::from_secs(3);

/// How many recent ops events the startup scan inspects to recover the last
/// known connectivity state.
const STARTUP_SCAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy)]
struct DeviceState {
    known: bool,
    connected: bool,
    last_seen_at: Instant,
}

pub struct OpsMonitor {
    store: Arc<dyn Store>,
    cfg: OpsConfig,
    state: Mutex<DeviceState>,
}

impl OpsMonitor {
    pub fn new(store: Arc<dyn Store>, cfg: OpsConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            cfg,
            state: Mutex::new(DeviceState {
                known: false,
                connected: false,
                last_seen_at: Instant::now(),
            }),
        })
    }

    /// Recover connectivity state from the most recent ops events and record
    /// the restart itself.
    pub async fn init(&self) {
        match self.store.latest_ops_events(STARTUP_SCAN_LIMIT).await {
            Ok(events) => {
                for event in events {
                    match event.kind {
                        OpsEventKind::DeviceConnected => {
                            let mut state = self.state.lock().expect("monitor lock poisoned");
                            state.known = true;
                            state.connected = true;
                            break;
                        }
                        OpsEventKind::DeviceDisconnected => {
                            let mut state = self.state.lock().expect("monitor lock poisoned");
                            state.known = true;
                            state.connected = false;
                            break;
                        }
                        OpsEventKind::BackendRestarted => {}
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not scan ops events at startup"),
        }

        self.persist_event(
            OpsEventKind::BackendRestarted,
            "Backend restarted",
            "telemetry backend came up",
        );
    }

    /// Called from every ingest handler after a successful store write.
    pub fn note_ingest(&self, now_ms: i64) {
        let was_connected = {
            let mut state = self.state.lock().expect("monitor lock poisoned");
            let was = state.known && state.connected;
            state.known = true;
            state.connected = true;
            state.last_seen_at = Instant::now();
            was
        };

        if !was_connected {
            info!("device connected");
            self.persist_event_at(
                now_ms,
                OpsEventKind::DeviceConnected,
                "Device connected",
                "ingest resumed",
            );
        }
    }

    /// Tick loop flipping the device to disconnected after the offline
    /// timeout elapses without ingest.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.monitor_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => self.check_offline(),
            }
        }
    }

    fn check_offline(&self) {
        let went_offline = {
            let mut state = self.state.lock().expect("monitor lock poisoned");
            if state.known
                && state.connected
                && state.last_seen_at.elapsed() >= self.cfg.device_offline_timeout
            {
                state.connected = false;
                true
            } else {
                false
            }
        };

        if went_offline {
            warn!(timeout = ?self.cfg.device_offline_timeout, "device disconnected");
            self.persist_event(
                OpsEventKind::DeviceDisconnected,
                "Device disconnected",
                "no readings within the offline timeout",
            );
        }
    }

    fn persist_event(&self, kind: OpsEventKind, title: &'static str, detail: &'static str) {
        self.persist_event_at(chrono::Utc::now().timestamp_millis(), kind, title, detail);
    }

    /// Fire-and-forget persistence with a bounded deadline.  State has
    /// already transitioned; a failed write is logged, not rolled back.
    fn persist_event_at(
        &self,
        timestamp: i64,
        kind: OpsEventKind,
        title: &'static str,
        detail: &'static str,
    ) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match tokio::time::timeout(
                PERSIST_TIMEOUT,
                store.add_ops_event(timestamp, kind, title, detail),
            )
            .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(kind = kind.as_str(), error = %e, "failed to persist ops event"),
                Err(_) => warn!(kind = kind.as_str(), "ops event persistence timed out"),
            }
        });
    }

    #[cfg(test)]
    fn snapshot_state(&self) -> (bool, bool) {
        let state = self.state.lock().unwrap();
        (state.known, state.connected)
    }
}
