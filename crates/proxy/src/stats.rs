//! Atomic stats counters (§4.D "Stats counters").

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Total requests, total WebSocket connections, active connections — the
/// three counters the spec calls out by name. Cheap to clone (`Arc`
/// internally); every accepted connection's task holds one.
#[derive(Clone, Default)]
pub struct ProxyStats {
    inner: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicI64,
    total_websocket_connections: AtomicI64,
    active_connections: AtomicI64,
}

/// A point-in-time read of [`ProxyStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    pub total_requests: i64,
    pub total_websocket_connections: i64,
    pub active_connections: i64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.inner.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_websocket_connection(&self) {
        self.inner.total_websocket_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.inner.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.inner.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_requests: self.inner.total_requests.load(Ordering::Relaxed),
            total_websocket_connections: self.inner.total_websocket_connections.load(Ordering::Relaxed),
            active_connections: self.inner.active_connections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_open_and_close() {
        let stats = ProxyStats::new();
        stats.record_request();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 1);
        assert_eq!(snap.active_connections, 1);
    }
}
