//! Delivery Fan-out
//!
//! Pushes one event to every connection in a room. Each connection is tried
//! independently with `try_send`, so a stalled or half-closed socket never
//! holds up the others.

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::protocol::ServerEvent;
use super::registry::{ConnectionId, ConnectionRegistry};

/// Per-call delivery counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    /// Outbound queue was full; the event was dropped for that connection.
    pub dropped: usize,
    /// Writer already gone; the connection is about to leave.
    pub closed: usize,
}

impl DeliveryReport {
    pub fn merge(self, other: DeliveryReport) -> DeliveryReport {
        DeliveryReport {
            delivered: self.delivered + other.delivered,
            dropped: self.dropped + other.dropped,
            closed: self.closed + other.closed,
        }
    }

    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.closed
    }
}

/// Deliver `event` to every connection in `room`, optionally skipping one.
///
/// An empty room is not an error: offline recipients catch up from persisted
/// history.
pub fn deliver(
    registry: &ConnectionRegistry,
    room: &str,
    event: &ServerEvent,
    except: Option<ConnectionId>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for (conn_id, sender) in registry.senders(room) {
        if Some(conn_id) == except {
            continue;
        }
        match sender.try_send(event.clone()) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %conn_id, room, "Outbound queue full, dropping event");
                report.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %conn_id, room, "Outbound queue closed");
                report.closed += 1;
            }
        }
    }

    report
}
