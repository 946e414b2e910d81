//! In-process fan-out of readings to connected stream subscribers.
//!
//! Delivery is strictly non-blocking: each subscriber gets a bounded channel,
//! and a full buffer means that subscriber misses the reading.  A slow SSE
//! client can therefore never stall the ingest path.  Within one subscriber,
//! readings arrive in publish order.

use aeris_protocol::SensorReading;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

/// Per-subscriber channel depth.  Bursts beyond this are dropped for that
/// subscriber only.
const SUBSCRIBER_BUFFER: usize = 64;

/// Cheap-to-clone handle; all clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct StreamHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<SensorReading>>>,
    next_id: AtomicU64,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber.  Dropping the [`Subscription`] (or calling
    /// `unsubscribe`) removes it and closes the channel.
    pub fn subscribe(&self) -> (mpsc::Receiver<SensorReading>, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .expect("hub lock poisoned")
            .insert(id, tx);
        (
            rx,
            Subscription {
                hub: Arc::clone(&self.inner),
                id,
                done: AtomicBool::new(false),
            },
        )
    }

    /// Deliver `reading` to every current subscriber without blocking.
    ///
    /// The sender list is snapshotted under the read lock and the sends happen
    /// outside it.  Closed receivers are pruned lazily afterwards.
    pub fn publish(&self, reading: &SensorReading) {
        let senders: Vec<(u64, mpsc::Sender<SensorReading>)> = {
            let map = self.inner.subscribers.read().expect("hub lock poisoned");
            map.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut closed = Vec::new();
        for (id, tx) in senders {
            match tx.try_send(reading.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(subscriber = id, "stream buffer full, dropping reading");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            let mut map = self.inner.subscribers.write().expect("hub lock poisoned");
            for id in closed {
                map.remove(&id);
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .expect("hub lock poisoned")
            .len()
    }
}

/// Opaque unsubscribe capability returned by [`StreamHub::subscribe`].
pub struct Subscription {
    hub: Arc<HubInner>,
    id: u64,
    done: AtomicBool,
}

impl Subscription {
    /// Idempotent; the subscriber's channel closes once removed.
    pub fn unsubscribe(&self) {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.hub
                .subscribers
                .write()
                .expect("hub lock poisoned")
                .remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
