//! Relay Protocol Types
//!
//! Every frame is a JSON text frame shaped `{"event": <name>, "data": <payload>}`.
//! Client frames are decoded by hand so that a bad frame maps onto a precise
//! [`RelayError`]; server frames are plain serde.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RelayError;

pub const JOIN: &str = "join";
pub const SEND_MESSAGE: &str = "sendMessage";
pub const TYPING: &str = "typing";

/// Messages sent FROM the client TO the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Enrol this connection into the room of the given user identity.
    Join(String),
    /// Announce a message the API layer has already persisted.
    SendMessage(SendMessage),
    Typing(TypingSignal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    /// Assigned by the persistence layer; echoed verbatim.
    pub message_id: Value,
    /// Assigned by the persistence layer; echoed verbatim.
    pub timestamp: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub sender_id: String,
    pub receiver_id: String,
    pub is_typing: bool,
}

/// Messages sent FROM the server TO the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(ChatEvent),
    UserTyping(UserTyping),
    /// Sent only to the connection whose frame was rejected.
    Error(ErrorNotice),
}

/// Wire representation of a persisted message, fanned out to both rooms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    pub id: Value,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub timestamp: Value,
}

impl From<SendMessage> for ChatEvent {
    fn from(msg: SendMessage) -> Self {
        Self {
            id: msg.message_id,
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            text: msg.text,
            timestamp: msg.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTyping {
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorNotice {
    pub code: String,
    pub message: String,
}

impl From<&RelayError> for ErrorNotice {
    fn from(err: &RelayError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode and shape-check one client frame.
pub fn decode_client_frame(text: &str) -> Result<ClientEvent, RelayError> {
    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.event.as_str() {
        JOIN => Ok(ClientEvent::Join(required_str(
            JOIN,
            "userId",
            Some(envelope.data),
        )?)),
        SEND_MESSAGE => {
            let mut data = object(SEND_MESSAGE, envelope.data)?;
            Ok(ClientEvent::SendMessage(SendMessage {
                sender_id: required_str(SEND_MESSAGE, "senderId", data.remove("senderId"))?,
                receiver_id: required_str(SEND_MESSAGE, "receiverId", data.remove("receiverId"))?,
                text: required_str(SEND_MESSAGE, "text", data.remove("text"))?,
                message_id: required_scalar(SEND_MESSAGE, "messageId", data.remove("messageId"))?,
                timestamp: required_scalar(SEND_MESSAGE, "timestamp", data.remove("timestamp"))?,
            }))
        }
        TYPING => {
            let mut data = object(TYPING, envelope.data)?;
            Ok(ClientEvent::Typing(TypingSignal {
                sender_id: required_str(TYPING, "senderId", data.remove("senderId"))?,
                receiver_id: required_str(TYPING, "receiverId", data.remove("receiverId"))?,
                is_typing: required_bool(TYPING, "isTyping", data.remove("isTyping"))?,
            }))
        }
        other => Err(RelayError::UnknownEvent(other.to_string())),
    }
}

fn object(event: &'static str, data: Value) -> Result<Map<String, Value>, RelayError> {
    match data {
        Value::Object(map) => Ok(map),
        Value::Null => Err(RelayError::MissingField {
            event,
            field: "data",
        }),
        _ => Err(RelayError::InvalidField {
            event,
            field: "data",
            reason: "expected an object".into(),
        }),
    }
}

fn required_str(
    event: &'static str,
    field: &'static str,
    value: Option<Value>,
) -> Result<String, RelayError> {
    match value {
        None | Some(Value::Null) => Err(RelayError::MissingField { event, field }),
        Some(Value::String(s)) if s.trim().is_empty() => Err(RelayError::InvalidField {
            event,
            field,
            reason: "must not be empty".into(),
        }),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(RelayError::InvalidField {
            event,
            field,
            reason: "expected a string".into(),
        }),
    }
}

/// Opaque identifiers assigned upstream: a non-empty string or a number.
fn required_scalar(
    event: &'static str,
    field: &'static str,
    value: Option<Value>,
) -> Result<Value, RelayError> {
    match value {
        None | Some(Value::Null) => Err(RelayError::MissingField { event, field }),
        Some(Value::Number(n)) => Ok(Value::Number(n)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Value::String(s)),
        Some(Value::String(_)) => Err(RelayError::InvalidField {
            event,
            field,
            reason: "must not be empty".into(),
        }),
        Some(_) => Err(RelayError::InvalidField {
            event,
            field,
            reason: "expected a string or a number".into(),
        }),
    }
}

fn required_bool(
    event: &'static str,
    field: &'static str,
    value: Option<Value>,
) -> Result<bool, RelayError> {
    match value {
        None | Some(Value::Null) => Err(RelayError::MissingField { event, field }),
        Some(Value::Bool(b)) => Ok(b),
        Some(_) => Err(RelayError::InvalidField {
            event,
            field,
            reason: "expected a boolean".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn send_message_frame(data: Value) -> String {
        json!({ "event": "sendMessage", "data": data }).to_string()
    }

    #[test]
    fn test_decode_join() {
        let event = decode_client_frame(r#"{"event":"join","data":"user-1"}"#).unwrap();
        assert_eq!(event, ClientEvent::Join("user-1".into()));
    }

    #[test]
    fn test_decode_join_without_user() {
        let err = decode_client_frame(r#"{"event":"join"}"#).unwrap_err();
        assert!(matches!(
            err,
            RelayError::MissingField {
                event: "join",
                field: "userId"
            }
        ));
    }

    #[test]
    fn test_decode_join_with_blank_user() {
        let err = decode_client_frame(r#"{"event":"join","data":"   "}"#).unwrap_err();
        assert_eq!(err.error_code(), "invalid_field");
    }

    #[test]
    fn test_decode_send_message() {
        let frame = send_message_frame(json!({
            "senderId": "a",
            "receiverId": "b",
            "text": "hello",
            "messageId": "msg-1",
            "timestamp": "2025-01-01T00:00:00.000Z",
        }));
        match decode_client_frame(&frame).unwrap() {
            ClientEvent::SendMessage(msg) => {
                assert_eq!(msg.sender_id, "a");
                assert_eq!(msg.receiver_id, "b");
                assert_eq!(msg.text, "hello");
                assert_eq!(msg.message_id, json!("msg-1"));
                assert_eq!(msg.timestamp, json!("2025-01-01T00:00:00.000Z"));
            }
            other => panic!("Expected SendMessage, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_send_message_numeric_ids_are_kept() {
        let frame = send_message_frame(json!({
            "senderId": "a",
            "receiverId": "b",
            "text": "hello",
            "messageId": 42,
            "timestamp": 1735689600000u64,
        }));
        match decode_client_frame(&frame).unwrap() {
            ClientEvent::SendMessage(msg) => {
                assert_eq!(msg.message_id, json!(42));
                assert_eq!(msg.timestamp, json!(1735689600000u64));
            }
            other => panic!("Expected SendMessage, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_send_message_missing_text() {
        let frame = send_message_frame(json!({
            "senderId": "a",
            "receiverId": "b",
            "messageId": "msg-1",
            "timestamp": "t",
        }));
        let err = decode_client_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            RelayError::MissingField {
                event: "sendMessage",
                field: "text"
            }
        ));
    }

    #[test]
    fn test_decode_send_message_whitespace_text() {
        let frame = send_message_frame(json!({
            "senderId": "a",
            "receiverId": "b",
            "text": " \n\t",
            "messageId": "msg-1",
            "timestamp": "t",
        }));
        let err = decode_client_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidField {
                field: "text",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_send_message_wrong_types() {
        let frame = send_message_frame(json!({
            "senderId": 7,
            "receiverId": "b",
            "text": "hi",
            "messageId": "msg-1",
            "timestamp": "t",
        }));
        let err = decode_client_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidField {
                field: "senderId",
                ..
            }
        ));

        let frame = send_message_frame(json!({
            "senderId": "a",
            "receiverId": "b",
            "text": "hi",
            "messageId": {"nested": true},
            "timestamp": "t",
        }));
        let err = decode_client_frame(&frame).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidField {
                field: "messageId",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_send_message_data_not_object() {
        let err = decode_client_frame(r#"{"event":"sendMessage","data":"oops"}"#).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidField { field: "data", .. }
        ));
        let err = decode_client_frame(r#"{"event":"sendMessage"}"#).unwrap_err();
        assert!(matches!(
            err,
            RelayError::MissingField { field: "data", .. }
        ));
    }

    #[test]
    fn test_decode_typing() {
        let frame = r#"{"event":"typing","data":{"senderId":"a","receiverId":"b","isTyping":true}}"#;
        assert_eq!(
            decode_client_frame(frame).unwrap(),
            ClientEvent::Typing(TypingSignal {
                sender_id: "a".into(),
                receiver_id: "b".into(),
                is_typing: true,
            })
        );
    }

    #[test]
    fn test_decode_typing_flag_must_be_bool() {
        let frame = r#"{"event":"typing","data":{"senderId":"a","receiverId":"b","isTyping":"yes"}}"#;
        let err = decode_client_frame(frame).unwrap_err();
        assert!(matches!(
            err,
            RelayError::InvalidField {
                field: "isTyping",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_unknown_event() {
        let err = decode_client_frame(r#"{"event":"wave","data":{}}"#).unwrap_err();
        assert!(matches!(err, RelayError::UnknownEvent(ref e) if e == "wave"));
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode_client_frame("not json").unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
        let err = decode_client_frame(r#"{"data":"no event"}"#).unwrap_err();
        assert!(matches!(err, RelayError::Decode(_)));
    }

    #[test]
    fn test_client_event_serializes_to_decodable_frame() {
        let event = ClientEvent::SendMessage(SendMessage {
            sender_id: "a".into(),
            receiver_id: "b".into(),
            text: "hi".into(),
            message_id: json!("m1"),
            timestamp: json!("t1"),
        });
        let frame = serde_json::to_string(&event).unwrap();
        assert!(frame.contains(r#""event":"sendMessage""#));
        assert!(frame.contains(r#""messageId":"m1""#));
        assert_eq!(decode_client_frame(&frame).unwrap(), event);
    }

    #[test]
    fn test_server_event_new_message_wire_shape() {
        let event = ServerEvent::NewMessage(ChatEvent {
            id: json!("m1"),
            sender_id: "a".into(),
            receiver_id: "b".into(),
            text: "hi".into(),
            timestamp: json!("t1"),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "newMessage",
                "data": {
                    "id": "m1",
                    "senderId": "a",
                    "receiverId": "b",
                    "text": "hi",
                    "timestamp": "t1",
                }
            })
        );
    }

    #[test]
    fn test_server_event_user_typing_wire_shape() {
        let event = ServerEvent::UserTyping(UserTyping {
            user_id: "a".into(),
            is_typing: false,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({ "event": "userTyping", "data": { "userId": "a", "isTyping": false } })
        );
    }

    #[test]
    fn test_error_notice_from_relay_error() {
        let err = RelayError::UnknownEvent("wave".into());
        let notice = ErrorNotice::from(&err);
        assert_eq!(notice.code, "unknown_event");
        assert_eq!(notice.message, "unknown event: wave");
    }

    #[test]
    fn test_chat_event_from_send_message() {
        let msg = SendMessage {
            sender_id: "a".into(),
            receiver_id: "b".into(),
            text: "hi".into(),
            message_id: json!(9),
            timestamp: json!("t"),
        };
        let event = ChatEvent::from(msg);
        assert_eq!(event.id, json!(9));
        assert_eq!(event.sender_id, "a");
    }
}
