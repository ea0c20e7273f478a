//! Error types and stable error codes for the relay.

use crate::relay::registry::ConnectionId;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("{event}: missing required field `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },

    #[error("{event}: invalid field `{field}`: {reason}")]
    InvalidField {
        event: &'static str,
        field: &'static str,
        reason: String,
    },

    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("message store: {0}")]
    Store(#[from] StoreError),
}

impl RelayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "malformed_frame",
            Self::UnknownEvent(_) => "unknown_event",
            Self::MissingField { .. } => "missing_field",
            Self::InvalidField { .. } => "invalid_field",
            Self::UnknownConnection(_) => "unknown_connection",
            Self::Store(_) => "store_failed",
        }
    }

    /// Protocol errors are the client's fault and are reported back to it.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::UnknownEvent(_)
                | Self::MissingField { .. }
                | Self::InvalidField { .. }
        )
    }
}

/// Failure reported by the external persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}
