// aeris-protocol: wire types for the air-quality telemetry backend.
//
// Everything the HTTP surface exchanges with edge devices and dashboards is
// defined here: sensor readings (with the lenient ingest codec in `codec`),
// insight alerts and snapshots, and persisted ops events.

use serde::{Deserialize, Serialize};

pub mod codec;

pub use codec::{DecodeError, decode_reading, decode_readings_batch};

// ---------------------------------------------------------------------------
// Sensor readings
// ---------------------------------------------------------------------------

/// One timestamped vector of sensor metrics, exactly as the device sent it.
///
/// `timestamp` is unix seconds or milliseconds -- devices differ, and the
/// value is stored as received.  Readings are append-only; nothing updates or
/// deletes them except retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: i64,
    pub temperature: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub oxidised: f64,
    pub reduced: f64,
    pub nh3: f64,
    pub pm1: f64,
    pub pm2: f64,
    pub pm10: f64,
}

// ---------------------------------------------------------------------------
// Insights
// ---------------------------------------------------------------------------

/// A single normalized insight element produced by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// One of `alert`, `insight`, `tip`.
    pub kind: String,
    /// One of `critical`, `warn`, `info`.
    pub severity: String,
    pub title: String,
    pub message: String,
}

/// What caused an insights recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Startup,
    Interval,
    Event,
    Pending,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Startup => "startup",
            Trigger::Interval => "interval",
            Trigger::Event => "event",
            Trigger::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "startup" => Some(Trigger::Startup),
            "interval" => Some(Trigger::Interval),
            "event" => Some(Trigger::Event),
            "pending" => Some(Trigger::Pending),
            _ => None,
        }
    }
}

/// The latest computed insights payload, persisted as a singleton row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsSnapshot {
    pub insights: Vec<Alert>,
    /// Free-form analyzer identifier, e.g. `"openai"`.
    pub source: String,
    /// Milliseconds since epoch.
    pub generated_at: i64,
    /// Number of readings handed to the analyzer.
    pub analyzed_samples: i64,
    /// Requested max samples.
    pub analysis_limit: i64,
    pub trigger: Trigger,
}

const ALERT_TITLE_MAX: usize = 60;
const ALERT_MESSAGE_MAX: usize = 180;

/// Clean up raw analyzer output into the published alert shape.
///
/// Kind and severity are lowercased and trimmed; an empty kind is derived
/// from severity (`critical`/`warn` map to `alert`, everything else to
/// `insight`).  Alerts with a blank title or message are dropped.  Title and
/// message are truncated to their caps, and the list is cut to `cap`.
pub fn normalize_alerts(raw: Vec<Alert>, cap: usize) -> Vec<Alert> {
    let mut out = Vec::with_capacity(raw.len().min(cap));
    for alert in raw {
        let severity = alert.severity.trim().to_lowercase();
        let mut kind = alert.kind.trim().to_lowercase();
        if kind.is_empty() {
            kind = match severity.as_str() {
                "critical" | "warn" => "alert".to_owned(),
                _ => "insight".to_owned(),
            };
        }
        let title = alert.title.trim();
        let message = alert.message.trim();
        if title.is_empty() || message.is_empty() {
            continue;
        }
        out.push(Alert {
            kind,
            severity,
            title: truncate_chars(title, ALERT_TITLE_MAX),
            message: truncate_chars(message, ALERT_MESSAGE_MAX),
        });
        if out.len() == cap {
            break;
        }
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_owned()
    } else {
        s.chars().take(max).collect()
    }
}

// ---------------------------------------------------------------------------
// Ops events
// ---------------------------------------------------------------------------

/// Kind of a persisted operational transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpsEventKind {
    DeviceConnected,
    DeviceDisconnected,
    BackendRestarted,
}

impl OpsEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpsEventKind::DeviceConnected => "device_connected",
            OpsEventKind::DeviceDisconnected => "device_disconnected",
            OpsEventKind::BackendRestarted => "backend_restarted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "device_connected" => Some(OpsEventKind::DeviceConnected),
            "device_disconnected" => Some(OpsEventKind::DeviceDisconnected),
            "backend_restarted" => Some(OpsEventKind::BackendRestarted),
            _ => None,
        }
    }
}

/// A persisted record of a backend-observed operational transition.
///
/// `id` is assigned by the store; `timestamp` is milliseconds since epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpsEvent {
    pub id: i64,
    pub timestamp: i64,
    pub kind: OpsEventKind,
    pub title: String,
    pub detail: String,
}
