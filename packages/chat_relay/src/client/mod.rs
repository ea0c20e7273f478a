//! Client side of the relay: connection, typing debounce, conversation view.

pub mod connection;
pub mod debounce;
pub mod feed;

pub use connection::{ClientError, RelayClient};
pub use debounce::{PeerTypingWatchdog, TypingDebouncer};
pub use feed::{ConversationFeed, FeedUpdate};
