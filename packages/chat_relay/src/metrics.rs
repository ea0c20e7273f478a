//! Relay metrics for observability
//!
//! Lock-free counters updated on the hot path, exposed as a JSON snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::relay::fanout::DeliveryReport;

/// Relay-wide metrics
#[derive(Debug, Default)]
pub struct RelayMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since start
    pub total_connections: AtomicU64,
    /// Connections torn down after missing the heartbeat
    pub idle_disconnects: AtomicU64,

    // Event metrics
    /// Client frames received
    pub events_received: AtomicU64,
    /// Client frames rejected by shape validation
    pub malformed_events: AtomicU64,
    /// `sendMessage` events fanned out
    pub messages_relayed: AtomicU64,
    /// `typing` events fanned out
    pub typing_relayed: AtomicU64,
    /// Typing states cleared by the server (TTL or disconnect)
    pub typing_expired: AtomicU64,

    // Delivery metrics
    /// Events pushed onto a connection's outbound queue
    pub deliveries: AtomicU64,
    /// Events dropped because a connection's queue was full
    pub deliveries_dropped: AtomicU64,

    start_time: Option<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn idle_disconnect(&self) {
        self.idle_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_event(&self) {
        self.malformed_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_relayed(&self, report: DeliveryReport) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
        self.record_delivery(report);
    }

    pub fn typing_relayed(&self, report: DeliveryReport) {
        self.typing_relayed.fetch_add(1, Ordering::Relaxed);
        self.record_delivery(report);
    }

    pub fn typing_expired(&self, report: DeliveryReport) {
        self.typing_expired.fetch_add(1, Ordering::Relaxed);
        self.record_delivery(report);
    }

    fn record_delivery(&self, report: DeliveryReport) {
        self.deliveries
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.deliveries_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                idle_disconnects: self.idle_disconnects.load(Ordering::Relaxed),
            },
            events: EventMetrics {
                received: self.events_received.load(Ordering::Relaxed),
                malformed: self.malformed_events.load(Ordering::Relaxed),
                messages_relayed: self.messages_relayed.load(Ordering::Relaxed),
                typing_relayed: self.typing_relayed.load(Ordering::Relaxed),
                typing_expired: self.typing_expired.load(Ordering::Relaxed),
            },
            deliveries: DeliveryMetrics {
                delivered: self.deliveries.load(Ordering::Relaxed),
                dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            },
        }
    }
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub events: EventMetrics,
    pub deliveries: DeliveryMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub idle_disconnects: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetrics {
    pub received: u64,
    pub malformed: u64,
    pub messages_relayed: u64,
    pub typing_relayed: u64,
    pub typing_expired: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub delivered: u64,
    pub dropped: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub connections: u64,
    pub rooms: u64,
    pub uptime_secs: u64,
}
