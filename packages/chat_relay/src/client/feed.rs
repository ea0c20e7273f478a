//! Receiver-side view of one conversation.
//!
//! Rooms carry every conversation a user is part of, so a client has to keep
//! only the events for the peer it is looking at. A message id already seen
//! (from loaded history or an earlier delivery) is dropped.

use serde_json::Value;
use std::collections::HashSet;
use std::time::Instant;

use crate::relay::protocol::{ChatEvent, ServerEvent};

use super::debounce::PeerTypingWatchdog;

/// What a relayed event changed in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Message(ChatEvent),
    PeerTyping(bool),
    Ignored,
}

pub struct ConversationFeed {
    self_id: String,
    peer_id: String,
    seen: HashSet<String>,
    messages: Vec<ChatEvent>,
    peer_typing: PeerTypingWatchdog,
}

impl ConversationFeed {
    pub fn new(self_id: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Self::with_watchdog(self_id, peer_id, PeerTypingWatchdog::default())
    }

    pub fn with_watchdog(
        self_id: impl Into<String>,
        peer_id: impl Into<String>,
        peer_typing: PeerTypingWatchdog,
    ) -> Self {
        Self {
            self_id: self_id.into(),
            peer_id: peer_id.into(),
            seen: HashSet::new(),
            messages: Vec::new(),
            peer_typing,
        }
    }

    /// Seed with persisted history. Returns how many were new.
    pub fn load_history(&mut self, history: impl IntoIterator<Item = ChatEvent>) -> usize {
        history
            .into_iter()
            .filter(|event| self.accept(event.clone()))
            .count()
    }

    /// Add a `newMessage` if it belongs here and has not been seen.
    pub fn accept(&mut self, event: ChatEvent) -> bool {
        if !self.belongs(&event) || !self.seen.insert(id_key(&event.id)) {
            return false;
        }
        self.messages.push(event);
        true
    }

    pub fn handle(&mut self, event: &ServerEvent, now: Instant) -> FeedUpdate {
        match event {
            ServerEvent::NewMessage(message) => {
                if self.accept(message.clone()) {
                    FeedUpdate::Message(message.clone())
                } else {
                    FeedUpdate::Ignored
                }
            }
            ServerEvent::UserTyping(typing) if typing.user_id == self.peer_id => {
                self.peer_typing.observe(typing.is_typing, now);
                FeedUpdate::PeerTyping(typing.is_typing)
            }
            _ => FeedUpdate::Ignored,
        }
    }

    pub fn messages(&self) -> &[ChatEvent] {
        &self.messages
    }

    pub fn peer_is_typing(&self, now: Instant) -> bool {
        self.peer_typing.is_typing(now)
    }

    fn belongs(&self, event: &ChatEvent) -> bool {
        (event.sender_id == self.self_id && event.receiver_id == self.peer_id)
            || (event.sender_id == self.peer_id && event.receiver_id == self.self_id)
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
