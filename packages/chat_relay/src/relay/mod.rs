//! Relay core: per-user rooms, event routing and delivery.

pub mod fanout;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod submit;
pub mod typing;

pub use fanout::{DeliveryReport, deliver};
pub use handler::handle_connection;
pub use protocol::{ChatEvent, ClientEvent, ErrorNotice, ServerEvent, UserTyping};
pub use registry::{ConnectionId, ConnectionRegistry, JoinOutcome, LeaveOutcome};
pub use router::EventRouter;
pub use submit::{MessageDraft, MessageStore, PersistedMessage, submit};
pub use typing::{TypingState, TypingTracker};
