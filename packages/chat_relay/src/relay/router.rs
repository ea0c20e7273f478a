//! Event Router
//!
//! Decodes inbound frames from a connection and routes them:
//! - `join`        → room membership
//! - `sendMessage` → `newMessage` to the sender's AND the receiver's rooms
//! - `typing`      → `userTyping` to the receiver's room only
//!
//! Also owns the server-side typing TTL and its sweeper.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::metrics::RelayMetrics;

use super::fanout::{DeliveryReport, deliver};
use super::protocol::{
    ChatEvent, ClientEvent, SendMessage, ServerEvent, TypingSignal, UserTyping, decode_client_frame,
};
use super::registry::{
    ConnectionId, ConnectionRegistry, ConnectionSender, JoinOutcome, LeaveOutcome,
};
use super::typing::TypingTracker;

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    typing: TypingTracker,
    metrics: Arc<RelayMetrics>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<RelayMetrics>,
        typing_ttl: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            typing: TypingTracker::new(typing_ttl),
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn typing_states(&self) -> &TypingTracker {
        &self.typing
    }

    /// Register a new connection. It joins no room until it sends `join`.
    pub fn connect(&self, sender: ConnectionSender) -> ConnectionId {
        let conn_id = ConnectionId::new();
        self.registry.register(conn_id, sender);
        conn_id
    }

    /// Remove a connection from its room. When it was the user's last
    /// connection, any typing indicator that user still holds is cleared.
    pub fn disconnect(&self, conn_id: ConnectionId) -> Option<LeaveOutcome> {
        let outcome = self.registry.leave(conn_id)?;
        if outcome.room_empty {
            for receiver in self.typing.clear_sender(&outcome.user_id) {
                let report = self.emit_typing(&outcome.user_id, &receiver, false, None);
                self.metrics.typing_expired(report);
                debug!(
                    user_id = %outcome.user_id,
                    receiver = %receiver,
                    "Cleared typing on last disconnect"
                );
            }
        }
        Some(outcome)
    }

    /// Decode one text frame and route it.
    pub fn dispatch_text(&self, conn_id: ConnectionId, text: &str) -> Result<(), RelayError> {
        self.metrics.event_received();
        let event = decode_client_frame(text).inspect_err(|_| self.metrics.malformed_event())?;
        self.dispatch(conn_id, event)
    }

    pub fn dispatch(&self, conn_id: ConnectionId, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::Join(user_id) => self.join(conn_id, &user_id).map(|_| ()),
            ClientEvent::SendMessage(msg) => {
                self.send_message(msg);
                Ok(())
            }
            ClientEvent::Typing(signal) => {
                self.typing(conn_id, signal);
                Ok(())
            }
        }
    }

    pub fn join(&self, conn_id: ConnectionId, user_id: &str) -> Result<JoinOutcome, RelayError> {
        let outcome = self.registry.join(conn_id, user_id)?;
        match &outcome {
            JoinOutcome::Joined => {
                info!(conn_id = %conn_id, user_id, "Connection joined room");
            }
            JoinOutcome::AlreadyMember => {
                debug!(conn_id = %conn_id, user_id, "Connection already in room");
            }
            JoinOutcome::Moved { from } => {
                info!(conn_id = %conn_id, user_id, from = %from, "Connection moved rooms");
            }
        }
        Ok(outcome)
    }

    /// Relay an already-persisted message announced by a client.
    pub fn send_message(&self, msg: SendMessage) -> DeliveryReport {
        // The message ends the burst; the sender's client emits its own `false`.
        self.typing.clear(&msg.sender_id, &msg.receiver_id);
        self.publish(ChatEvent::from(msg))
    }

    /// Fan a persisted message out to every connection of both participants.
    pub fn publish(&self, event: ChatEvent) -> DeliveryReport {
        let sender_room = event.sender_id.clone();
        let receiver_room = event.receiver_id.clone();
        let event = ServerEvent::NewMessage(event);

        let mut report = deliver(&self.registry, &sender_room, &event, None);
        if receiver_room != sender_room {
            report = report.merge(deliver(&self.registry, &receiver_room, &event, None));
        }

        debug!(
            sender = %sender_room,
            receiver = %receiver_room,
            delivered = report.delivered,
            dropped = report.dropped,
            "Relayed newMessage"
        );
        self.metrics.message_relayed(report);
        report
    }

    /// Relay a typing signal to the receiver's room, never back to the
    /// emitting connection.
    pub fn typing(&self, conn_id: ConnectionId, signal: TypingSignal) -> DeliveryReport {
        self.typing_at(conn_id, signal, Instant::now())
    }

    /// [`typing`](Self::typing) with an explicit clock, so TTL arithmetic can
    /// be driven deterministically.
    pub fn typing_at(
        &self,
        conn_id: ConnectionId,
        signal: TypingSignal,
        now: Instant,
    ) -> DeliveryReport {
        self.typing
            .record(&signal.sender_id, &signal.receiver_id, signal.is_typing, now);
        let report = self.emit_typing(
            &signal.sender_id,
            &signal.receiver_id,
            signal.is_typing,
            Some(conn_id),
        );
        self.metrics.typing_relayed(report);
        report
    }

    fn emit_typing(
        &self,
        sender_id: &str,
        receiver_id: &str,
        is_typing: bool,
        except: Option<ConnectionId>,
    ) -> DeliveryReport {
        let event = ServerEvent::UserTyping(UserTyping {
            user_id: sender_id.to_string(),
            is_typing,
        });
        deliver(&self.registry, receiver_id, &event, except)
    }

    /// Expire stale typing states and tell their receivers. Returns how many
    /// expired.
    pub fn expire_typing(&self, now: Instant) -> usize {
        let expired = self.typing.expire(now);
        for state in &expired {
            let report = self.emit_typing(&state.sender_id, &state.receiver_id, false, None);
            self.metrics.typing_expired(report);
            debug!(
                sender = %state.sender_id,
                receiver = %state.receiver_id,
                "Typing indicator expired"
            );
        }
        expired.len()
    }

    /// Run [`expire_typing`](Self::expire_typing) on an interval until
    /// cancelled. Nothing is spawned when the TTL is disabled.
    pub fn spawn_typing_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        self.typing.ttl()?;
        let router = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Typing sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        router.expire_typing(Instant::now());
                    }
                }
            }
        }))
    }
}
