//! Session lifecycle counters for one managed connection.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// Counters updated by [`ManagedConnection`](crate::database::ManagedConnection).
#[derive(Debug, Default)]
pub struct ConnectionMetrics {
    sessions_opened: AtomicU32,
    sessions_closed: AtomicU32,
    connection_errors: AtomicU32,
    reconnects: AtomicU32,
    idle_closures: AtomicU32,
    queries_executed: AtomicU32,
    query_errors: AtomicU32,
}

impl ConnectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_idle_closure(&self) {
        self.idle_closures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query_error(&self) {
        self.query_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            idle_closures: self.idle_closures.load(Ordering::Relaxed),
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            query_errors: self.query_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ConnectionMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_opened: u32,
    pub sessions_closed: u32,
    pub connection_errors: u32,
    pub reconnects: u32,
    pub idle_closures: u32,
    pub queries_executed: u32,
    pub query_errors: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_recorded_events() {
        let metrics = ConnectionMetrics::new();
        metrics.record_session_opened();
        metrics.record_session_opened();
        metrics.record_session_closed();
        metrics.record_reconnect();
        metrics.record_query_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sessions_opened, 2);
        assert_eq!(snapshot.sessions_closed, 1);
        assert_eq!(snapshot.reconnects, 1);
        assert_eq!(snapshot.query_errors, 1);
        assert_eq!(snapshot.queries_executed, 0);
    }
}
