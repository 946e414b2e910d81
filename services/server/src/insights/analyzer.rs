//! The analyzer capability the insights engine consumes.

use aeris_protocol::{Alert, SensorReading};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analyzer returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("analyzer reply unparseable: {0}")]
    Parse(String),
}

/// Turns a window of readings into at most a handful of alerts.
///
/// Implementations may call external services; the engine bounds each call
/// with its analyze timeout and treats any error as "keep the old snapshot".
#[async_trait]
pub trait AlertAnalyzer: Send + Sync {
    async fn analyze(&self, readings: &[SensorReading]) -> Result<Vec<Alert>, AnalyzerError>;

    /// Free-form identifier recorded in the snapshot, e.g. `"openai"`.
    fn source(&self) -> &str;
}
