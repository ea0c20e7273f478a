//! Typing State
//!
//! Server-held record of which (sender, receiver) pairs are currently flagged
//! as typing. A `true` signal arms or refreshes a TTL; the router's sweeper
//! expires stale entries and tells the receiver `isTyping: false`, so a sender
//! that crashes mid-sentence does not leave a stuck indicator behind.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Transient typing state for one (sender, receiver) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingState {
    pub sender_id: String,
    pub receiver_id: String,
    pub is_typing: bool,
    /// `None` when the TTL is disabled or the state is not typing.
    pub expires_at: Option<Instant>,
}

pub struct TypingTracker {
    ttl: Option<Duration>,
    /// (sender, receiver) -> expiry
    states: DashMap<(String, String), Option<Instant>>,
}

impl TypingTracker {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            ttl,
            states: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Apply a typing signal. Last write wins for the pair.
    pub fn record(
        &self,
        sender_id: &str,
        receiver_id: &str,
        is_typing: bool,
        now: Instant,
    ) -> TypingState {
        let key = (sender_id.to_string(), receiver_id.to_string());
        let expires_at = if is_typing {
            let expires_at = self.ttl.map(|ttl| now + ttl);
            self.states.insert(key, expires_at);
            expires_at
        } else {
            self.states.remove(&key);
            None
        };

        TypingState {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            is_typing,
            expires_at,
        }
    }

    /// Forget the pair without emitting anything. Returns whether it was typing.
    pub fn clear(&self, sender_id: &str, receiver_id: &str) -> bool {
        self.states
            .remove(&(sender_id.to_string(), receiver_id.to_string()))
            .is_some()
    }

    /// Forget every pair where `sender_id` is typing. Returns the receivers.
    pub fn clear_sender(&self, sender_id: &str) -> Vec<String> {
        let keys: Vec<(String, String)> = self
            .states
            .iter()
            .filter(|entry| entry.key().0 == sender_id)
            .map(|entry| entry.key().clone())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.states.remove(&key).map(|((_, receiver), _)| receiver))
            .collect()
    }

    /// Remove and return every state whose TTL has run out by `now`.
    pub fn expire(&self, now: Instant) -> Vec<TypingState> {
        let due: Vec<(String, String)> = self
            .states
            .iter()
            .filter(|entry| entry.value().is_some_and(|at| at <= now))
            .map(|entry| entry.key().clone())
            .collect();

        due.into_iter()
            .filter_map(|key| {
                // A refresh may have landed since the scan
                self.states
                    .remove_if(&key, |_, at| at.is_some_and(|at| at <= now))
                    .map(|((sender_id, receiver_id), at)| TypingState {
                        sender_id,
                        receiver_id,
                        is_typing: false,
                        expires_at: at,
                    })
            })
            .collect()
    }

    pub fn is_typing(&self, sender_id: &str, receiver_id: &str) -> bool {
        self.states
            .contains_key(&(sender_id.to_string(), receiver_id.to_string()))
    }

    pub fn active_count(&self) -> usize {
        self.states.len()
    }
}
