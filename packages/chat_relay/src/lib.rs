//! Realtime relay for one-to-one chat.
//!
//! Every user owns a room named after their identifier; each open connection
//! joins exactly one room. Persisted messages fan out to the sender's and the
//! receiver's rooms, typing signals to the receiver's room only. Nothing is
//! stored here: offline users catch up from the message store.

pub mod client;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod server;

pub use config::{FileConfig, RelayConfig, ServerConfig};
pub use error::{RelayError, StoreError};
pub use server::{AppState, RelayServer, build_router};
