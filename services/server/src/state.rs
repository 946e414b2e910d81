use crate::hub::StreamHub;
use crate::insights::InsightsEngine;
use crate::ops::OpsMonitor;
use crate::ratelimit::RateLimiter;
use crate::store::Store;
use std::sync::Arc;

/// Shared handler state.  Each field has exactly one owner of its mutable
/// internals; the state itself is cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub hub: StreamHub,
    pub monitor: Arc<OpsMonitor>,
    /// `None` when no analyzer is configured; the insights endpoint then
    /// answers 503.
    pub insights: Option<InsightsEngine>,
    pub limiter: Arc<RateLimiter>,
    pub ingest_api_key: Arc<str>,
    pub trust_proxy_headers: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        hub: StreamHub,
        monitor: Arc<OpsMonitor>,
        insights: Option<InsightsEngine>,
        limiter: Arc<RateLimiter>,
        ingest_api_key: &str,
        trust_proxy_headers: bool,
    ) -> Self {
        Self {
            store,
            hub,
            monitor,
            insights,
            limiter,
            ingest_api_key: Arc::from(ingest_api_key),
            trust_proxy_headers,
        }
    }
}
