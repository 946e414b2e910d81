//! Per-identity request limiter for the read endpoints.
//!
//! Fixed one-minute windows anchored at each identity's first request; the
//! window slides forward when it expires.  The entries map is compacted
//! opportunistically once it grows past a size threshold, so no background
//! task is needed.

use axum::http::HeaderMap;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const COMPACT_THRESHOLD: usize = 512;

struct Entry {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    max_per_window: u32,
    entries: Mutex<HashMap<String, Entry>>,
}

impl RateLimiter {
    pub fn new(max_per_window: u32) -> Self {
        Self {
            max_per_window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `identity`; `false` means over budget.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    fn allow_at(&self, identity: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().expect("limiter lock poisoned");

        if entries.len() > COMPACT_THRESHOLD {
            entries.retain(|_, e| now.duration_since(e.window_start) < WINDOW);
        }

        let entry = entries.entry(identity.to_owned()).or_insert(Entry {
            window_start: now,
            count: 0,
        });
        if now.duration_since(entry.window_start) >= WINDOW {
            entry.window_start = now;
            entry.count = 0;
        }
        entry.count += 1;
        entry.count <= self.max_per_window
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().expect("limiter lock poisoned").len()
    }
}

/// Resolve the identity a request is limited by.
///
/// Proxy headers are only honored when the deployment says the proxy chain is
/// trusted; otherwise any client could spoof a fresh identity per request.
pub fn client_identity(headers: &HeaderMap, peer: SocketAddr, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_owned();
        }
        if let Some(real_ip) = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            return real_ip.to_owned();
        }
    }
    peer.ip().to_string()
}
