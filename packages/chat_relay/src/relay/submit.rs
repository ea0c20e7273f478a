//! Persist-then-publish
//!
//! An API layer running the relay in-process hands messages over through
//! [`submit`]: the store write happens first, and only a successfully
//! persisted message is fanned out.

use std::future::Future;
use tracing::{debug, warn};

use crate::error::{RelayError, StoreError};

use super::fanout::DeliveryReport;
use super::protocol::{ChatEvent, SEND_MESSAGE};
use super::router::EventRouter;

/// A validated message that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    sender_id: String,
    receiver_id: String,
    text: String,
}

impl MessageDraft {
    /// Trims `text`; rejects empty text or a missing receiver.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        text: impl AsRef<str>,
    ) -> Result<Self, RelayError> {
        let sender_id = sender_id.into();
        let receiver_id = receiver_id.into();
        if sender_id.trim().is_empty() {
            return Err(RelayError::MissingField {
                event: SEND_MESSAGE,
                field: "senderId",
            });
        }
        if receiver_id.trim().is_empty() {
            return Err(RelayError::MissingField {
                event: SEND_MESSAGE,
                field: "receiverId",
            });
        }
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(RelayError::InvalidField {
                event: SEND_MESSAGE,
                field: "text",
                reason: "message text is empty".into(),
            });
        }

        Ok(Self {
            sender_id,
            receiver_id,
            text: text.to_string(),
        })
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// A message as the store recorded it. `id` and `timestamp` are assigned by
/// the store and relayed verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: String,
}

impl From<&PersistedMessage> for ChatEvent {
    fn from(msg: &PersistedMessage) -> Self {
        ChatEvent {
            id: msg.id.clone().into(),
            sender_id: msg.sender_id.clone(),
            receiver_id: msg.receiver_id.clone(),
            text: msg.text.clone(),
            timestamp: msg.timestamp.clone().into(),
        }
    }
}

/// Durable message storage owned by the surrounding application.
pub trait MessageStore: Send + Sync {
    fn create_message(
        &self,
        draft: MessageDraft,
    ) -> impl Future<Output = Result<PersistedMessage, StoreError>> + Send;
}

/// Persist `draft`, then publish it to both participants' rooms.
///
/// A store failure is returned and nothing is delivered.
pub async fn submit<S: MessageStore>(
    store: &S,
    router: &EventRouter,
    draft: MessageDraft,
) -> Result<(PersistedMessage, DeliveryReport), RelayError> {
    let persisted = match store.create_message(draft).await {
        Ok(persisted) => persisted,
        Err(e) => {
            warn!(error = %e, "Message store rejected message, not relaying");
            return Err(e.into());
        }
    };

    let report = router.publish(ChatEvent::from(&persisted));
    debug!(message_id = %persisted.id, delivered = report.delivered, "Submitted message");
    Ok((persisted, report))
}
