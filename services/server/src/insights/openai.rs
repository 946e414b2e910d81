//! [`AlertAnalyzer`] backed by an OpenAI-compatible chat endpoint.
//!
//! The model never sees raw readings.  Each call condenses the analysis
//! window into one compact summary per metric (latest, mean, min/max, and
//! 10/60-minute deltas) and requests a reply constrained by a JSON schema,
//! so parsing the answer is a plain deserialize instead of prompt archaeology.

use crate::config::OpenAiConfig;
use crate::insights::analyzer::{AlertAnalyzer, AnalyzerError};
use aeris_protocol::{Alert, SensorReading};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

const SYSTEM_PROMPT: &str = "You are an air-quality assistant for a single-sensor home station. \
Given summarized sensor metrics, reply with at most three short items: alerts for unhealthy or \
rapidly worsening conditions, insights for notable trends, tips for practical advice. \
Severity: critical for immediately unhealthy air, warn for deteriorating conditions, info otherwise. \
Be concrete and avoid repeating raw numbers the dashboard already shows.";

pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    cfg: OpenAiConfig,
}

impl OpenAiAnalyzer {
    /// No client-level timeout: the engine bounds every call with its own
    /// analyze deadline.
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }
}

#[async_trait]
impl AlertAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, readings: &[SensorReading]) -> Result<Vec<Alert>, AnalyzerError> {
        let summary = summarize(readings);
        let body = json!({
            "model": self.cfg.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": serde_json::to_string(&summary)
                    .map_err(|e| AnalyzerError::Parse(e.to_string()))?},
            ],
            "response_format": response_schema(),
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(512);
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AnalyzerError::Parse("no choices in completion".to_owned()))?;

        parse_reply(&content)
    }

    fn source(&self) -> &str {
        "openai"
    }
}

fn parse_reply(content: &str) -> Result<Vec<Alert>, AnalyzerError> {
    let reply: AnalyzerReply = serde_json::from_str(content)
        .map_err(|e| AnalyzerError::Parse(format!("reply content: {e}")))?;
    Ok(reply.insights)
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct AnalyzerReply {
    insights: Vec<Alert>,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "air_quality_insights",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "insights": {
                        "type": "array",
                        "maxItems": 3,
                        "items": {
                            "type": "object",
                            "properties": {
                                "kind": {"type": "string", "enum": ["alert", "insight", "tip"]},
                                "severity": {"type": "string", "enum": ["critical", "warn", "info"]},
                                "title": {"type": "string"},
                                "message": {"type": "string"}
                            },
                            "required": ["kind", "severity", "title", "message"],
                            "additionalProperties": false
                        }
                    }
                },
                "required": ["insights"],
                "additionalProperties": false
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Metric summary
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, PartialEq)]
struct MetricSummary {
    latest: f64,
    mean: f64,
    min: f64,
    max: f64,
    /// Change over the trailing 10 minutes (or the available span if shorter).
    delta_10m: f64,
    delta_60m: f64,
}

#[derive(Debug, Serialize)]
struct WindowSummary {
    samples: usize,
    span_seconds: i64,
    metrics: std::collections::BTreeMap<&'static str, MetricSummary>,
}

const METRICS: [(&str, fn(&SensorReading) -> f64); 9] = [
    ("temperature", |r| r.temperature),
    ("pressure", |r| r.pressure),
    ("humidity", |r| r.humidity),
    ("oxidised", |r| r.oxidised),
    ("reduced", |r| r.reduced),
    ("nh3", |r| r.nh3),
    ("pm1", |r| r.pm1),
    ("pm2", |r| r.pm2),
    ("pm10", |r| r.pm10),
];

/// Devices send seconds or milliseconds; deltas need wall-clock windows, so
/// millisecond values are folded down before bucketing.
fn ts_secs(raw: i64) -> i64 {
    if raw >= 1_000_000_000_000 { raw / 1000 } else { raw }
}

fn summarize(readings: &[SensorReading]) -> WindowSummary {
    if readings.is_empty() {
        return WindowSummary {
            samples: 0,
            span_seconds: 0,
            metrics: std::collections::BTreeMap::new(),
        };
    }

    let latest = &readings[readings.len() - 1];
    let latest_ts = ts_secs(latest.timestamp);
    let oldest_ts = ts_secs(readings[0].timestamp);

    let metrics = METRICS
        .iter()
        .map(|&(name, get)| {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;
            let mut sum = 0.0;
            for r in readings {
                let v = get(r);
                min = min.min(v);
                max = max.max(v);
                sum += v;
            }
            (
                name,
                MetricSummary {
                    latest: get(latest),
                    mean: sum / readings.len() as f64,
                    min,
                    max,
                    delta_10m: delta_over(readings, get, latest_ts, 600),
                    delta_60m: delta_over(readings, get, latest_ts, 3600),
                },
            )
        })
        .collect();

    WindowSummary {
        samples: readings.len(),
        span_seconds: latest_ts - oldest_ts,
        metrics,
    }
}

/// Latest value minus the value at the start of the trailing window.  The
/// baseline is the earliest reading inside the window, so a short history
/// degrades to "delta over everything we have".
fn delta_over(
    readings: &[SensorReading],
    get: fn(&SensorReading) -> f64,
    latest_ts: i64,
    window_secs: i64,
) -> f64 {
    let cutoff = latest_ts - window_secs;
    let baseline = readings
        .iter()
        .find(|r| ts_secs(r.timestamp) >= cutoff)
        .unwrap_or(&readings[0]);
    get(&readings[readings.len() - 1]) - get(baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeris_test_utils::reading;

    fn series(start_ts: i64, step: i64, pm2_values: &[f64]) -> Vec<SensorReading> {
        pm2_values
            .iter()
            .enumerate()
            .map(|(i, &pm2)| {
                let mut r = reading(start_ts + i as i64 * step);
                r.pm2 = pm2;
                r
            })
            .collect()
    }

    #[test]
    fn summary_covers_all_metrics() {
        let readings = series(1_700_000_000, 60, &[1.0, 2.0, 3.0]);
        let summary = summarize(&readings);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.span_seconds, 120);
        assert_eq!(summary.metrics.len(), 9);
    }

    #[test]
    fn pm2_summary_math() {
        // 60s apart: all three fall inside the 10-minute window.
        let readings = series(1_700_000_000, 60, &[1.0, 5.0, 3.0]);
        let summary = summarize(&readings);
        let pm2 = &summary.metrics["pm2"];
        assert_eq!(pm2.latest, 3.0);
        assert_eq!(pm2.mean, 3.0);
        assert_eq!(pm2.min, 1.0);
        assert_eq!(pm2.max, 5.0);
        assert_eq!(pm2.delta_10m, 2.0);
        assert_eq!(pm2.delta_60m, 2.0);
    }

    #[test]
    fn ten_minute_delta_uses_window_baseline() {
        // 5 minutes apart: only the last three fit the 10-minute window.
        let readings = series(1_700_000_000, 300, &[10.0, 20.0, 30.0, 40.0]);
        let summary = summarize(&readings);
        let pm2 = &summary.metrics["pm2"];
        assert_eq!(pm2.delta_10m, 20.0); // 40 - 20
        assert_eq!(pm2.delta_60m, 30.0); // 40 - 10
    }

    #[test]
    fn millisecond_timestamps_are_folded() {
        let mut readings = series(1_700_000_000, 300, &[10.0, 20.0, 30.0]);
        for r in &mut readings {
            r.timestamp *= 1000;
        }
        let summary = summarize(&readings);
        assert_eq!(summary.span_seconds, 600);
    }

    #[test]
    fn empty_window_summarizes_to_nothing() {
        let summary = summarize(&[]);
        assert_eq!(summary.samples, 0);
        assert!(summary.metrics.is_empty());
    }

    #[test]
    fn reply_parses_schema_shape() {
        let content = r#"{"insights":[{"kind":"alert","severity":"warn","title":"PM2.5 rising","message":"Open a window"}]}"#;
        let alerts = parse_reply(content).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, "alert");
    }

    #[test]
    fn malformed_reply_is_a_parse_error() {
        assert!(matches!(
            parse_reply("not json").unwrap_err(),
            AnalyzerError::Parse(_)
        ));
        assert!(matches!(
            parse_reply(r#"{"wrong":[]}"#).unwrap_err(),
            AnalyzerError::Parse(_)
        ));
    }
}
